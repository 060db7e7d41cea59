//! Execution policies: target weights in, executed weights and turnover out.

use super::backtest::BacktestState;
use super::position::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// L1 distance between the executed and previous positions.
    pub turnover: f64,
    pub position: Position,
}

impl Execution {
    fn against(state: &BacktestState, position: Position) -> Self {
        Execution {
            turnover: position.l1_distance(state.previous_position()),
            position,
        }
    }
}

/// Configured execution policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionKind {
    Naive,
    Partial { fill_ratio: f64 },
}

impl ExecutionKind {
    pub fn parse(name: &str, fill_ratio: f64) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "naive" => Some(ExecutionKind::Naive),
            "partial" => Some(ExecutionKind::Partial { fill_ratio }),
            _ => None,
        }
    }

    pub fn policy(&self) -> Box<dyn ExecutionPolicy> {
        match *self {
            ExecutionKind::Naive => Box::new(NaiveExecutor),
            ExecutionKind::Partial { fill_ratio } => Box::new(PartialFillExecutor { fill_ratio }),
        }
    }
}

/// Translates a target position into the position actually held.
///
/// Callers must not assume the executed position equals the target.
pub trait ExecutionPolicy {
    fn execute(&self, target: &Position, state: &BacktestState) -> Execution;
}

/// Fills every target weight exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveExecutor;

impl ExecutionPolicy for NaiveExecutor {
    fn execute(&self, target: &Position, state: &BacktestState) -> Execution {
        Execution::against(state, target.clone())
    }
}

/// Moves each weight `fill_ratio` of the way from the previous position to the
/// target. Codes dropped from the target are unwound completely.
#[derive(Debug, Clone, Copy)]
pub struct PartialFillExecutor {
    pub fill_ratio: f64,
}

impl ExecutionPolicy for PartialFillExecutor {
    fn execute(&self, target: &Position, state: &BacktestState) -> Execution {
        let previous = state.previous_position();
        let mut executed = Position::new();
        for (code, target_weight) in target.iter() {
            let prev = previous.weight(code);
            executed.set(code, prev + self.fill_ratio * (target_weight - prev));
        }
        Execution::against(state, executed)
    }
}
