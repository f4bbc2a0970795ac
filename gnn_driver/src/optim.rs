use crate::error::{GnnError, Result};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdaGradConfig, AdamConfig, RmsPropConfig, SgdConfig};
use clap::Args;
use std::f64::consts::PI;
use std::str::FromStr;

/// Where trained models are written unless `--models-dir` says otherwise.
pub const MODELS_DIR: &str = "models/";
/// Where validation accuracy histories are written unless `--validation-dir` says otherwise.
pub const VALIDATION_DIR: &str = "validation/";

const SGD_MOMENTUM: f64 = 0.95;

/// Optimizer flags shared by every training entry point.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct OptimizerArgs {
    /// Type of optimizer: adam, sgd, rmsprop or adagrad
    #[arg(long = "opt", default_value = "adam")]
    pub opt: String,

    /// Type of learning rate scheduler: none, step or cos
    #[arg(long = "opt-scheduler", visible_alias = "opt_scheduler", default_value = "none")]
    pub opt_scheduler: String,

    /// Cosine annealing period in epochs (defaults to the epoch count)
    #[arg(long = "opt-restart", visible_alias = "opt_restart")]
    pub opt_restart: Option<usize>,

    /// Epochs between step decays
    #[arg(long = "opt-decay-step", visible_alias = "opt_decay_step", default_value_t = 100)]
    pub opt_decay_step: usize,

    /// Multiplier applied at every step decay
    #[arg(long = "opt-decay-rate", visible_alias = "opt_decay_rate", default_value_t = 0.1)]
    pub opt_decay_rate: f64,

    /// L2 weight decay
    #[arg(long = "weight-decay", visible_alias = "weight_decay", default_value_t = 0.0)]
    pub weight_decay: f64,

    /// Learning rate
    #[arg(long, default_value_t = 0.01)]
    pub lr: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    Sgd,
    RmsProp,
    AdaGrad,
}

impl FromStr for OptimizerKind {
    type Err = GnnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "adam" => Ok(OptimizerKind::Adam),
            "sgd" => Ok(OptimizerKind::Sgd),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            "adagrad" => Ok(OptimizerKind::AdaGrad),
            other => Err(GnnError::UnknownOptimizer(other.to_string())),
        }
    }
}

/// Learning rate as a function of the zero-based epoch index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LrSchedule {
    Constant { lr: f64 },
    Step { lr: f64, step: usize, rate: f64 },
    Cosine { lr: f64, period: usize },
}

impl LrSchedule {
    pub fn lr(&self, epoch: usize) -> f64 {
        match *self {
            LrSchedule::Constant { lr } => lr,
            LrSchedule::Step { lr, step, rate } => lr * rate.powi((epoch / step.max(1)) as i32),
            LrSchedule::Cosine { lr, period } => {
                let period = period.max(1) as f64;
                lr * (1.0 + (PI * epoch as f64 / period).cos()) / 2.0
            }
        }
    }
}

impl OptimizerArgs {
    pub fn kind(&self) -> Result<OptimizerKind> {
        self.opt.parse()
    }

    pub fn schedule(&self, epochs: usize) -> Result<LrSchedule> {
        match self.opt_scheduler.as_str() {
            "none" => Ok(LrSchedule::Constant { lr: self.lr }),
            "step" => Ok(LrSchedule::Step {
                lr: self.lr,
                step: self.opt_decay_step,
                rate: self.opt_decay_rate,
            }),
            "cos" => Ok(LrSchedule::Cosine {
                lr: self.lr,
                period: self.opt_restart.unwrap_or(epochs),
            }),
            other => Err(GnnError::UnknownScheduler(other.to_string())),
        }
    }

    fn weight_decay_config(&self) -> Option<WeightDecayConfig> {
        (self.weight_decay > 0.0).then(|| WeightDecayConfig::new(self.weight_decay))
    }

    pub fn adam_config(&self) -> AdamConfig {
        AdamConfig::new().with_weight_decay(self.weight_decay_config())
    }

    pub fn sgd_config(&self) -> SgdConfig {
        let momentum = MomentumConfig::new()
            .with_momentum(SGD_MOMENTUM)
            .with_dampening(0.0);
        SgdConfig::new()
            .with_momentum(Some(momentum))
            .with_weight_decay(self.weight_decay_config())
    }

    pub fn rmsprop_config(&self) -> RmsPropConfig {
        RmsPropConfig::new().with_weight_decay(self.weight_decay_config())
    }

    pub fn adagrad_config(&self) -> AdaGradConfig {
        AdaGradConfig::new().with_weight_decay(self.weight_decay_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(scheduler: &str) -> OptimizerArgs {
        OptimizerArgs {
            opt: "adam".to_string(),
            opt_scheduler: scheduler.to_string(),
            opt_restart: None,
            opt_decay_step: 10,
            opt_decay_rate: 0.5,
            weight_decay: 0.0,
            lr: 0.01,
        }
    }

    #[test]
    fn optimizer_names() {
        assert_eq!("adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert_eq!("sgd".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert_eq!("rmsprop".parse::<OptimizerKind>().unwrap(), OptimizerKind::RmsProp);
        assert_eq!("adagrad".parse::<OptimizerKind>().unwrap(), OptimizerKind::AdaGrad);
        assert!(matches!(
            "lbfgs".parse::<OptimizerKind>(),
            Err(GnnError::UnknownOptimizer(name)) if name == "lbfgs"
        ));
    }

    #[test]
    fn constant_schedule_ignores_epoch() {
        let schedule = args("none").schedule(500).unwrap();
        assert_eq!(schedule.lr(0), 0.01);
        assert_eq!(schedule.lr(499), 0.01);
    }

    #[test]
    fn step_schedule_decays_every_step() {
        let schedule = args("step").schedule(500).unwrap();
        assert_eq!(schedule.lr(9), 0.01);
        assert!((schedule.lr(10) - 0.005).abs() < 1e-12);
        assert!((schedule.lr(25) - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn cosine_schedule_reaches_zero_at_period() {
        let schedule = args("cos").schedule(100).unwrap();
        assert!((schedule.lr(0) - 0.01).abs() < 1e-12);
        assert!((schedule.lr(50) - 0.005).abs() < 1e-12);
        assert!(schedule.lr(100).abs() < 1e-12);

        let mut restart = args("cos");
        restart.opt_restart = Some(10);
        assert!(restart.schedule(100).unwrap().lr(10).abs() < 1e-12);
    }

    #[test]
    fn weight_decay_is_passed_through_when_positive() {
        let mut args = args("none");
        assert!(args.weight_decay_config().is_none());

        args.weight_decay = 5e-4;
        let decay = args.weight_decay_config().unwrap();
        assert_eq!(decay.penalty, 5e-4);
    }

    #[test]
    fn unknown_scheduler_is_rejected() {
        assert!(matches!(
            args("plateau").schedule(10),
            Err(GnnError::UnknownScheduler(_))
        ));
    }
}
