//! Factor preprocessing transforms applied to a feature matrix.
//!
//! `winsorize` and `standardize` work column by column. `neutralize` replaces
//! every column with its least-squares residual against a risk basis (style
//! exposures plus one-hot industries), so a typical pipeline reads
//! `winsorize,standardize,neutralize,winsorize,standardize`.

use std::fmt;

use nalgebra::DMatrix;

pub const DEFAULT_WINSORIZE_STDS: f64 = 3.0;

/// Singular values below this are treated as zero in the residual fit.
const NEUTRALIZE_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// Clip each column to mean ± `num_stds` standard deviations.
    Winsorize { num_stds: f64 },
    /// Rescale each column to zero mean and unit standard deviation.
    Standardize,
    /// Replace each column with its residual against the risk basis.
    Neutralize,
}

impl Transform {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "winsorize" | "winsorize_normal" => Some(Transform::Winsorize {
                num_stds: DEFAULT_WINSORIZE_STDS,
            }),
            "standardize" => Some(Transform::Standardize),
            "neutralize" => Some(Transform::Neutralize),
            _ => None,
        }
    }

    fn apply_column(&self, column: &mut [f64]) {
        let (mean, std) = mean_std(column);
        match *self {
            Transform::Winsorize { num_stds } => {
                if std == 0.0 {
                    return;
                }
                let lo = mean - num_stds * std;
                let hi = mean + num_stds * std;
                for v in column.iter_mut() {
                    *v = v.clamp(lo, hi);
                }
            }
            Transform::Standardize => {
                for v in column.iter_mut() {
                    *v = if std > 0.0 { (*v - mean) / std } else { 0.0 };
                }
            }
            // Whole-matrix transform, see `neutralize`.
            Transform::Neutralize => {}
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Winsorize { .. } => write!(f, "winsorize"),
            Transform::Standardize => write!(f, "standardize"),
            Transform::Neutralize => write!(f, "neutralize"),
        }
    }
}

/// Sample mean and standard deviation (n - 1 denominator).
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}

/// Residuals of every column of `rows` regressed on `basis` (no intercept
/// beyond what the basis carries). Rank-deficient bases are handled through
/// the SVD pseudo-inverse.
fn neutralize(rows: &mut [Vec<f64>], basis: &[Vec<f64>]) {
    let n = rows.len();
    let width = rows.first().map_or(0, Vec::len);
    let k = basis.first().map_or(0, Vec::len);
    if n == 0 || width == 0 || k == 0 {
        return;
    }
    if basis.len() != n {
        log::warn!(
            "risk basis has {} rows for {} assets, neutralization skipped",
            basis.len(),
            n
        );
        return;
    }

    let x = DMatrix::from_fn(n, k, |i, j| basis[i][j]);
    let y = DMatrix::from_fn(n, width, |i, j| rows[i][j]);
    let beta = match x.clone().svd(true, true).solve(&y, NEUTRALIZE_EPS) {
        Ok(beta) => beta,
        Err(e) => {
            log::warn!("neutralization skipped: {}", e);
            return;
        }
    };
    let residual = y - &x * beta;
    for (i, row) in rows.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = residual[(i, j)];
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown preprocessing transform '{0}'")]
pub struct UnknownTransform(pub String);

/// Risk columns factors are neutralized against.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskBasis {
    pub styles: Vec<String>,
    /// Add one dummy column per industry.
    pub industry: bool,
}

impl Default for RiskBasis {
    fn default() -> Self {
        RiskBasis {
            styles: vec!["SIZE".to_string()],
            industry: true,
        }
    }
}

/// Ordered list of transforms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub transforms: Vec<Transform>,
    pub basis: RiskBasis,
}

impl Pipeline {
    /// Parse a comma-separated list of transform names. Empty input gives an
    /// empty pipeline.
    pub fn parse(input: &str) -> Result<Self, UnknownTransform> {
        let transforms = input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| Transform::parse(name).ok_or_else(|| UnknownTransform(name.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Pipeline {
            transforms,
            basis: RiskBasis::default(),
        })
    }

    pub fn with_basis(mut self, basis: RiskBasis) -> Self {
        self.basis = basis;
        self
    }

    /// Whether `apply` needs risk basis rows.
    pub fn needs_basis(&self) -> bool {
        self.transforms.contains(&Transform::Neutralize)
    }

    /// Apply every transform in order to the row-major matrix. `basis` holds
    /// one row of risk exposures per matrix row and is only read by
    /// `neutralize`.
    pub fn apply(&self, rows: &mut [Vec<f64>], basis: &[Vec<f64>]) {
        let Some(width) = rows.first().map(Vec::len) else {
            return;
        };
        for transform in &self.transforms {
            if *transform == Transform::Neutralize {
                neutralize(rows, basis);
                continue;
            }
            for j in 0..width {
                let mut column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                transform.apply_column(&mut column);
                for (row, v) in rows.iter_mut().zip(column) {
                    row[j] = v;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pipeline(transforms: Vec<Transform>) -> Pipeline {
        Pipeline {
            transforms,
            ..Default::default()
        }
    }

    #[test]
    fn parse_pipeline() {
        let p = Pipeline::parse("winsorize, standardize").unwrap();
        assert_eq!(p.transforms.len(), 2);
        assert_eq!(p.transforms[1], Transform::Standardize);
        assert!(Pipeline::parse("").unwrap().transforms.is_empty());
        assert_eq!(
            Pipeline::parse("standardize,rank").unwrap_err(),
            UnknownTransform("rank".into())
        );
    }

    #[test]
    fn standardize_gives_zero_mean_unit_std() {
        let mut rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        pipeline(vec![Transform::Standardize]).apply(&mut rows, &[]);
        let col: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        let (mean, std) = mean_std(&col);
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(std, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn standardize_constant_column_is_zero() {
        let mut rows = vec![vec![5.0, 1.0], vec![5.0, 2.0]];
        pipeline(vec![Transform::Standardize]).apply(&mut rows, &[]);
        assert_eq!(rows[0][0], 0.0);
        assert_eq!(rows[1][0], 0.0);
    }

    #[test]
    fn winsorize_clips_outlier() {
        let mut rows: Vec<Vec<f64>> = (0..20).map(|i| vec![(i % 2) as f64]).collect();
        rows.push(vec![100.0]);
        let before: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        let (mean, std) = mean_std(&before);

        pipeline(vec![Transform::Winsorize { num_stds: 1.0 }]).apply(&mut rows, &[]);

        assert_abs_diff_eq!(rows[20][0], mean + std, epsilon = 1e-12);
        assert_eq!(rows[0][0], 0.0);
        assert_eq!(rows[1][0], 1.0);
    }

    #[test]
    fn parse_neutralize_step() {
        let p = Pipeline::parse("winsorize,standardize,neutralize,winsorize,standardize").unwrap();
        assert_eq!(p.transforms.len(), 5);
        assert_eq!(p.transforms[2], Transform::Neutralize);
        assert!(p.needs_basis());
        assert!(!Pipeline::parse("standardize").unwrap().needs_basis());
        assert_eq!(p.basis, RiskBasis::default());
    }

    #[test]
    fn neutralize_removes_basis_component() {
        // factor = 2 * size + industry offset + noise orthogonal to the basis
        let size = [1.0, -1.0, 0.5, -0.5, 2.0, -2.0];
        let industry = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let noise = [0.3, 0.3, -0.6, 0.2, 0.2, -0.4];
        let mut rows: Vec<Vec<f64>> = (0..6)
            .map(|i| vec![2.0 * size[i] + 5.0 * industry[i] + noise[i]])
            .collect();
        let basis: Vec<Vec<f64>> = (0..6)
            .map(|i| vec![size[i], 1.0 - industry[i], industry[i]])
            .collect();

        pipeline(vec![Transform::Neutralize]).apply(&mut rows, &basis);

        assert!(rows.iter().all(|r| r[0].is_finite()));
        // residual is orthogonal to every basis column
        for k in 0..3 {
            let dot: f64 = (0..6).map(|i| rows[i][0] * basis[i][k]).sum();
            assert_abs_diff_eq!(dot, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn neutralize_column_in_basis_span_is_zero() {
        let mut rows = vec![vec![2.0, 1.0], vec![4.0, 1.0], vec![-2.0, 1.0]];
        let basis = vec![vec![1.0], vec![2.0], vec![-1.0]];
        pipeline(vec![Transform::Neutralize]).apply(&mut rows, &basis);
        for row in &rows {
            assert_abs_diff_eq!(row[0], 0.0, epsilon = 1e-9);
        }
        // second column: 1 - (2/6) * x
        assert_abs_diff_eq!(rows[0][1], 1.0 - 1.0 / 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rows[1][1], 1.0 - 2.0 / 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rows[2][1], 1.0 + 1.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn neutralize_tolerates_collinear_basis() {
        let mut rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![6.0]];
        // two identical dummies
        let basis = vec![
            vec![1.0, 1.0],
            vec![1.0, 1.0],
            vec![1.0, 1.0],
            vec![1.0, 1.0],
        ];
        pipeline(vec![Transform::Neutralize]).apply(&mut rows, &basis);
        let values: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        assert_abs_diff_eq!(values[0], -2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(values[3], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn neutralize_without_basis_is_noop() {
        let mut rows = vec![vec![1.0], vec![2.0]];
        pipeline(vec![Transform::Neutralize]).apply(&mut rows, &[]);
        assert_eq!(rows, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn empty_matrix_is_noop() {
        let mut rows: Vec<Vec<f64>> = Vec::new();
        Pipeline::parse("winsorize,standardize").unwrap().apply(&mut rows, &[]);
        assert!(rows.is_empty());
    }
}
