use std::f64::consts::PI;

use burn::config::Config;
use burn::lr_scheduler::LrScheduler;
use burn::prelude::Backend;
use burn::LearningRate;

use crate::error::Error;

/// One-cycle policy: cosine warm-up from `max_lr / div_factor` to `max_lr`
/// over the first `pct_start` of the steps, then cosine decay to
/// `max_lr / (div_factor * final_div_factor)`.
#[derive(Config, Debug)]
pub struct OneCycleConfig {
    #[config(default = 0.002)]
    pub max_lr: f64,
    #[config(default = 0.1)]
    pub pct_start: f64,
    #[config(default = 25.0)]
    pub div_factor: f64,
    #[config(default = 1e4)]
    pub final_div_factor: f64,
}

impl OneCycleConfig {
    pub fn init(&self, total_steps: usize) -> crate::error::Result<OneCycleLr> {
        if total_steps == 0 {
            return Err(Error::Config("one-cycle schedule needs at least one step".into()));
        }
        if !(self.pct_start > 0.0 && self.pct_start < 1.0) {
            return Err(Error::Config(format!("pct_start {} is not in (0, 1)", self.pct_start)));
        }

        let initial_lr = self.max_lr / self.div_factor;

        Ok(OneCycleLr {
            initial_lr,
            max_lr: self.max_lr,
            min_lr: initial_lr / self.final_div_factor,
            warmup_end: self.pct_start * total_steps as f64 - 1.0,
            total_steps,
            current_step: 0,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OneCycleLr {
    initial_lr: f64,
    max_lr: f64,
    min_lr: f64,
    warmup_end: f64,
    total_steps: usize,
    current_step: usize,
}

fn cosine_anneal(start: f64, end: f64, pct: f64) -> f64 {
    end + (start - end) / 2.0 * ((PI * pct).cos() + 1.0)
}

fn progress(step: f64, start: f64, end: f64) -> f64 {
    if end > start {
        ((step - start) / (end - start)).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

impl OneCycleLr {
    fn lr_at(&self, step: usize) -> LearningRate {
        let step = step as f64;
        let last = (self.total_steps - 1) as f64;

        if step <= self.warmup_end {
            cosine_anneal(self.initial_lr, self.max_lr, progress(step, 0.0, self.warmup_end))
        } else {
            cosine_anneal(self.max_lr, self.min_lr, progress(step, self.warmup_end.max(0.0), last))
        }
    }

    /// Learning rate for the next optimizer step, then advances the schedule.
    /// Fails once every step has been taken.
    pub fn checked_step(&mut self) -> crate::error::Result<LearningRate> {
        if self.current_step >= self.total_steps {
            return Err(Error::Schedule(self.total_steps));
        }

        let lr = self.lr_at(self.current_step);
        self.current_step += 1;

        Ok(lr)
    }

    /// Learning rate the next step would use; the final rate once exhausted.
    pub fn current_lr(&self) -> LearningRate {
        self.lr_at(self.current_step.min(self.total_steps - 1))
    }

    pub fn steps_taken(&self) -> usize {
        self.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}

/// Past the last step this keeps returning the final rate.
impl<B: Backend> LrScheduler<B> for OneCycleLr {
    type Record = (f64, f64, f64, f64, usize, usize);

    fn step(&mut self) -> LearningRate {
        self.checked_step().unwrap_or(self.min_lr)
    }

    fn to_record(&self) -> Self::Record {
        (
            self.initial_lr,
            self.max_lr,
            self.min_lr,
            self.warmup_end,
            self.total_steps,
            self.current_step,
        )
    }

    fn load_record(self, record: Self::Record) -> Self {
        Self {
            initial_lr: record.0,
            max_lr: record.1,
            min_lr: record.2,
            warmup_end: record.3,
            total_steps: record.4,
            current_step: record.5,
        }
    }
}

#[test]
fn test_one_cycle_shape() {
    let mut schedule = OneCycleConfig::new().init(100).unwrap();

    let lrs = (0..100).map(|_| schedule.checked_step().unwrap()).collect::<Vec<_>>();

    assert!((lrs[0] - 0.002 / 25.0).abs() < 1e-12);
    assert!((lrs[9] - 0.002).abs() < 1e-12);
    assert!((lrs[99] - 0.002 / 25.0 / 1e4).abs() < 1e-12);
    assert!(lrs[..10].windows(2).all(|w| w[0] < w[1]));
    assert!(lrs[9..].windows(2).all(|w| w[0] > w[1]));
    assert_eq!(schedule.steps_taken(), 100);
}

#[test]
fn test_stepping_past_the_end_fails() {
    let mut schedule = OneCycleConfig::new().init(3).unwrap();

    for _ in 0..3 {
        schedule.checked_step().unwrap();
    }

    assert!(matches!(schedule.checked_step(), Err(Error::Schedule(3))));
    assert!((schedule.current_lr() - 0.002 / 25.0 / 1e4).abs() < 1e-12);
}

#[test]
fn test_short_schedules_stay_finite() {
    for total in 1..12 {
        let mut schedule = OneCycleConfig::new().init(total).unwrap();
        for _ in 0..total {
            let lr = schedule.checked_step().unwrap();
            assert!(lr.is_finite() && lr > 0.0 && lr <= 0.002);
        }
    }
}

#[test]
fn test_invalid_schedule_is_rejected() {
    assert!(OneCycleConfig::new().init(0).is_err());
    assert!(OneCycleConfig::new().with_pct_start(1.0).init(10).is_err());
}

#[test]
fn test_scheduler_trait_saturates_and_resumes() {
    use burn::backend::NdArray;

    let config = OneCycleConfig::new();
    let mut schedule = config.init(20).unwrap();
    let first = LrScheduler::<NdArray>::step(&mut schedule);
    assert!((first - 0.002 / 25.0).abs() < 1e-12);

    let record = LrScheduler::<NdArray>::to_record(&schedule);
    let mut resumed = LrScheduler::<NdArray>::load_record(config.init(20).unwrap(), record);
    assert_eq!(resumed.steps_taken(), 1);

    let rest = (0..19).map(|_| LrScheduler::<NdArray>::step(&mut resumed)).collect::<Vec<_>>();
    let expected = (1..20).map(|_| schedule.checked_step().unwrap()).collect::<Vec<_>>();
    assert_eq!(rest, expected);

    let floor = 0.002 / 25.0 / 1e4;
    for _ in 0..3 {
        assert!((LrScheduler::<NdArray>::step(&mut resumed) - floor).abs() < 1e-12);
    }
    assert_eq!(resumed.steps_taken(), 20);
}
