use chrono::{DateTime, Utc};
use common::domain::{NormalizedSensors, ScoredReading, SensorReading, SubScores};
use std::sync::Arc;

pub const AIR_WEIGHT: f64 = 0.40;
pub const THERMAL_WEIGHT: f64 = 0.30;
pub const LIGHT_WEIGHT: f64 = 0.20;
pub const ACOUSTIC_WEIGHT: f64 = 0.10;

/// Physical range a raw sensor value is clamped into before scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRange {
    pub min: f64,
    pub max: f64,
}

impl SensorRange {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// NaN maps to `min` so the scorer stays total
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// MQ135 analog reading
pub const MQ135_RANGE: SensorRange = SensorRange::new(0.0, 2000.0);
/// DHT22 operating range, degrees Celsius
pub const TEMPERATURE_RANGE: SensorRange = SensorRange::new(-40.0, 80.0);
pub const HUMIDITY_RANGE: SensorRange = SensorRange::new(0.0, 100.0);
/// 12-bit ADC
pub const LDR_RANGE: SensorRange = SensorRange::new(0.0, 4096.0);
pub const SOUND_RMS_RANGE: SensorRange = SensorRange::new(0.0, 2500.0);

const COMFORT_TEMPERATURE_C: f64 = 22.0;
const COMFORT_HUMIDITY_PCT: f64 = 50.0;
const COMFORT_LIGHT_LUX: (f64, f64) = (300.0, 600.0);

const SCORE_RANGE: SensorRange = SensorRange::new(0.0, 100.0);

/// Source of `processed_at` timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Computes the composite IEQ score of a validated reading.
///
/// Sub-score curves:
/// - air: `100 - mq135 / 20`
/// - thermal: mean of `100 - 5·|t - 22|` and `100 - 2·|h - 50|`, each floored at 0
/// - light: LDR scaled to 0-1000 lux; full marks inside 300-600 lux, linear below,
///   losing a point per 10 lux above
/// - acoustic: `100 - sound_rms / 25`
pub struct IeqScorer {
    clock: Arc<dyn Clock>,
}

impl IeqScorer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn score(&self, reading: SensorReading) -> ScoredReading {
        let (sub_scores, sensors) = compute_sub_scores(&reading);
        let ieq_score = SCORE_RANGE.clamp(weighted_sum(&sub_scores));
        let recorded_at = device_time(reading.timestamp);

        ScoredReading {
            reading,
            ieq_score,
            sub_scores,
            sensors,
            processed_at: self.clock.now(),
            recorded_at,
        }
    }
}

impl Default for IeqScorer {
    fn default() -> Self {
        Self::with_system_clock()
    }
}

/// Weighted combination of sub-scores, before the final clamp
pub fn weighted_sum(sub_scores: &SubScores) -> f64 {
    sub_scores.air * AIR_WEIGHT
        + sub_scores.thermal * THERMAL_WEIGHT
        + sub_scores.light * LIGHT_WEIGHT
        + sub_scores.acoustic * ACOUSTIC_WEIGHT
}

pub fn compute_sub_scores(reading: &SensorReading) -> (SubScores, NormalizedSensors) {
    let air_quality = 100.0 - MQ135_RANGE.clamp(reading.air_quality_raw) / 20.0;

    let temperature = TEMPERATURE_RANGE.clamp(reading.temperature_c);
    let humidity = HUMIDITY_RANGE.clamp(reading.humidity_pct);
    let temperature_score = 100.0 - (temperature - COMFORT_TEMPERATURE_C).abs() * 5.0;
    let humidity_score = 100.0 - (humidity - COMFORT_HUMIDITY_PCT).abs() * 2.0;
    let thermal = (SCORE_RANGE.clamp(temperature_score) + SCORE_RANGE.clamp(humidity_score)) / 2.0;

    let light = LDR_RANGE.clamp(reading.light_raw) / 4.096;
    let light_score = light_curve(light);

    let sound = SOUND_RMS_RANGE.clamp(reading.sound_rms) / 25.0;

    let sub_scores = SubScores {
        air: SCORE_RANGE.clamp(air_quality),
        thermal: SCORE_RANGE.clamp(thermal),
        light: SCORE_RANGE.clamp(light_score),
        acoustic: SCORE_RANGE.clamp(100.0 - sound),
    };

    let sensors = NormalizedSensors {
        temperature,
        humidity,
        air_quality,
        light,
        sound,
    };

    (sub_scores, sensors)
}

fn light_curve(lux: f64) -> f64 {
    let (low, high) = COMFORT_LIGHT_LUX;
    if lux < low {
        lux / low * 100.0
    } else if lux <= high {
        100.0
    } else {
        100.0 - (lux - high) / 10.0
    }
}

/// Device timestamps are epoch milliseconds when positive
fn device_time(timestamp: i64) -> Option<DateTime<Utc>> {
    if timestamp > 0 {
        DateTime::from_timestamp_millis(timestamp)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn fixed_scorer() -> IeqScorer {
        IeqScorer::new(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        )))
    }

    fn reading(mq135: f64, t: f64, h: f64, ldr: f64, sound_rms: f64) -> SensorReading {
        SensorReading {
            device_id: "esp32-001".to_string(),
            site_id: "home".to_string(),
            timestamp: 4225,
            air_quality_raw: mq135,
            temperature_c: t,
            humidity_pct: h,
            light_raw: ldr,
            sound_rms,
        }
    }

    fn assert_in_range(scored: &ScoredReading) {
        let values = [
            scored.ieq_score,
            scored.sub_scores.air,
            scored.sub_scores.thermal,
            scored.sub_scores.light,
            scored.sub_scores.acoustic,
        ];
        for value in values {
            assert!(
                (0.0..=100.0).contains(&value),
                "score {} out of range for {:?}",
                value,
                scored.reading
            );
        }
    }

    #[test]
    fn test_readme_sample_scores_near_72_5() {
        let scored = fixed_scorer().score(reading(785.0, 24.4, 63.4, 1114.0, 1056.826));

        assert!(
            (scored.ieq_score - 72.5).abs() < 0.5,
            "ieq_score was {}",
            scored.ieq_score
        );
        assert!((scored.sub_scores.air - 60.75).abs() < 1e-9);
        assert!((scored.sub_scores.thermal - 80.6).abs() < 1e-9);
        assert!((scored.sensors.light - 271.97265625).abs() < 1e-9);
    }

    #[test]
    fn test_ideal_environment_scores_100() {
        // 450 lux sits inside the comfort band
        let scored = fixed_scorer().score(reading(0.0, 22.0, 50.0, 450.0 * 4.096, 0.0));
        assert!((scored.ieq_score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_worst_environment_scores_near_zero() {
        let scored = fixed_scorer().score(reading(1e9, 80.0, 100.0, 0.0, 1e9));
        assert_in_range(&scored);
        assert!(scored.ieq_score < 1.0, "ieq_score was {}", scored.ieq_score);
    }

    #[test]
    fn test_out_of_range_inputs_are_clamped() {
        let scored = fixed_scorer().score(reading(-500.0, -300.0, 250.0, -1.0, -20.0));

        assert_in_range(&scored);
        assert_eq!(scored.sub_scores.air, 100.0);
        assert_eq!(scored.sub_scores.acoustic, 100.0);
        assert_eq!(scored.sensors.temperature, -40.0);
        assert_eq!(scored.sensors.humidity, 100.0);
        assert_eq!(scored.sensors.light, 0.0);
    }

    #[test]
    fn test_non_finite_inputs_stay_in_range() {
        let scorer = fixed_scorer();
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let scored = scorer.score(reading(value, value, value, value, value));
            assert_in_range(&scored);
        }
    }

    #[test]
    fn test_randomized_inputs_stay_in_range_and_match_weighted_sum() {
        let scorer = fixed_scorer();
        let mut rng = StdRng::seed_from_u64(0x1E0);

        for _ in 0..10_000 {
            let scored = scorer.score(reading(
                rng.gen_range(-10_000.0..10_000.0),
                rng.gen_range(-200.0..200.0),
                rng.gen_range(-50.0..150.0),
                rng.gen_range(-10_000.0..10_000.0),
                rng.gen_range(-10_000.0..10_000.0),
            ));

            assert_in_range(&scored);
            let expected = 0.4 * scored.sub_scores.air
                + 0.3 * scored.sub_scores.thermal
                + 0.2 * scored.sub_scores.light
                + 0.1 * scored.sub_scores.acoustic;
            assert!((scored.ieq_score - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_weighted_sum_for_arbitrary_sub_scores() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1_000 {
            let sub_scores = SubScores {
                air: rng.gen_range(0.0..=100.0),
                thermal: rng.gen_range(0.0..=100.0),
                light: rng.gen_range(0.0..=100.0),
                acoustic: rng.gen_range(0.0..=100.0),
            };
            let expected = 0.4 * sub_scores.air
                + 0.3 * sub_scores.thermal
                + 0.2 * sub_scores.light
                + 0.1 * sub_scores.acoustic;
            assert!((weighted_sum(&sub_scores) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let scorer = fixed_scorer();
        let input = reading(1234.5, 19.1, 71.0, 3000.0, 88.8);

        let first = scorer.score(input.clone());
        let second = scorer.score(input);
        assert_eq!(first, second);
    }

    #[test]
    fn test_higher_pollutant_and_noise_lower_the_score() {
        let scorer = fixed_scorer();
        let clean = scorer.score(reading(200.0, 22.0, 50.0, 1800.0, 100.0));
        let polluted = scorer.score(reading(1500.0, 22.0, 50.0, 1800.0, 100.0));
        let noisy = scorer.score(reading(200.0, 22.0, 50.0, 1800.0, 2000.0));

        assert!(polluted.sub_scores.air < clean.sub_scores.air);
        assert!(noisy.sub_scores.acoustic < clean.sub_scores.acoustic);
        assert!(polluted.ieq_score < clean.ieq_score);
        assert!(noisy.ieq_score < clean.ieq_score);
    }

    #[test]
    fn test_thermal_peaks_at_comfort_point() {
        let scorer = fixed_scorer();
        let comfortable = scorer.score(reading(0.0, 22.0, 50.0, 0.0, 0.0));
        let warm = scorer.score(reading(0.0, 27.0, 50.0, 0.0, 0.0));
        let humid = scorer.score(reading(0.0, 22.0, 80.0, 0.0, 0.0));

        assert_eq!(comfortable.sub_scores.thermal, 100.0);
        assert!((warm.sub_scores.thermal - 87.5).abs() < 1e-9);
        assert!((humid.sub_scores.thermal - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_light_curve_band() {
        assert!((light_curve(150.0) - 50.0).abs() < 1e-9);
        assert_eq!(light_curve(300.0), 100.0);
        assert_eq!(light_curve(600.0), 100.0);
        assert!((light_curve(800.0) - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_processed_at_comes_from_clock() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let scored = fixed_scorer().score(reading(785.0, 24.4, 63.4, 1114.0, 1056.826));
        assert_eq!(scored.processed_at, at);
    }

    #[test]
    fn test_recorded_at_from_positive_device_timestamp() {
        let scorer = fixed_scorer();
        let mut input = reading(785.0, 24.4, 63.4, 1114.0, 1056.826);

        input.timestamp = 1_767_225_600_000;
        let scored = scorer.score(input.clone());
        assert_eq!(
            scored.recorded_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
        );

        input.timestamp = 0;
        assert_eq!(scorer.score(input).recorded_at, None);
    }
}
