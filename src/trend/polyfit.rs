// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/trend/polyfit.rs - 最小二乘多项式拟合
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
  #[error("x 与 y 长度不一致: {0} != {1}")]
  LengthMismatch(usize, usize),
  #[error("不同的 x 值只有 {distinct} 个，{required} 阶拟合至少需要 {required_points} 个")]
  TooFewPoints {
    distinct: usize,
    required: usize,
    required_points: usize,
  },
  #[error("设计矩阵奇异: 秩 {rank} < {required}")]
  Singular { rank: usize, required: usize },
  #[error("输入或拟合结果包含非有限值")]
  NonFinite,
}

/// 多项式根，可能为复数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Root {
  pub re: f64,
  pub im: f64,
}

impl Root {
  pub fn is_real(&self) -> bool {
    self.im == 0.0
  }
}

/// 拟合得到的多项式
///
/// 拟合在把定义域 `[min, max]` 线性映射到 `[-1, 1]` 之后进行；
/// `coefficients` 已换算回原始坐标，按升幂排列。
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
  coefficients: Vec<f64>,
  scaled_coefficients: Vec<f64>,
  domain: [f64; 2],
  offset: f64,
  scale: f64,
}

impl Polynomial {
  pub fn coefficients(&self) -> &[f64] {
    &self.coefficients
  }

  pub fn domain(&self) -> [f64; 2] {
    self.domain
  }

  pub fn degree(&self) -> usize {
    self.coefficients.len().saturating_sub(1)
  }

  /// 在原始坐标下求值
  pub fn eval(&self, x: f64) -> f64 {
    let t = self.offset + self.scale * x;
    self
      .scaled_coefficients
      .iter()
      .rev()
      .fold(0.0, |acc, c| acc * t + c)
  }

  /// 求全部根（含复根），按实部、虚部排序
  pub fn roots(&self) -> Vec<Root> {
    let c = trim_trailing_zeros(&self.scaled_coefficients);
    let n = c.len().saturating_sub(1);
    let scaled: Vec<Root> = match n {
      0 => Vec::new(),
      1 => vec![Root {
        re: -c[0] / c[1],
        im: 0.0,
      }],
      _ => {
        // 伴随矩阵：次对角线为 1，最后一列为 -c[k] / c[n]
        let mut companion = DMatrix::<f64>::zeros(n, n);
        for i in 1..n {
          companion[(i, i - 1)] = 1.0;
        }
        for i in 0..n {
          companion[(i, n - 1)] = -c[i] / c[n];
        }
        companion
          .complex_eigenvalues()
          .iter()
          .map(|z| Root { re: z.re, im: z.im })
          .collect()
      }
    };

    let mut roots: Vec<Root> = scaled
      .into_iter()
      .map(|r| Root {
        re: (r.re - self.offset) / self.scale,
        im: r.im / self.scale,
      })
      .collect();
    roots.sort_by(|a, b| a.re.total_cmp(&b.re).then(a.im.total_cmp(&b.im)));
    roots
  }
}

fn trim_trailing_zeros(c: &[f64]) -> &[f64] {
  let mut end = c.len();
  while end > 1 && c[end - 1] == 0.0 {
    end -= 1;
  }
  &c[..end]
}

fn binomial(n: usize, k: usize) -> f64 {
  (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// 对 (x, y) 做 `degree` 阶最小二乘拟合
pub fn fit(x: &[f64], y: &[f64], degree: usize) -> Result<Polynomial, FitError> {
  if x.len() != y.len() {
    return Err(FitError::LengthMismatch(x.len(), y.len()));
  }
  if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
    return Err(FitError::NonFinite);
  }

  let required_points = degree + 1;
  let mut distinct = x.to_vec();
  distinct.sort_by(f64::total_cmp);
  distinct.dedup();
  if distinct.len() < required_points {
    return Err(FitError::TooFewPoints {
      distinct: distinct.len(),
      required: degree,
      required_points,
    });
  }

  let min = distinct[0];
  let max = distinct[distinct.len() - 1];
  let (offset, scale) = if max > min {
    (-(max + min) / (max - min), 2.0 / (max - min))
  } else {
    (-min, 1.0)
  };

  let n = x.len();
  let m = required_points;
  let vander = DMatrix::from_fn(n, m, |i, j| (offset + scale * x[i]).powi(j as i32));
  let rhs = DVector::from_column_slice(y);

  let svd = vander.svd(true, true);
  let max_sv = svd.singular_values.iter().copied().fold(0.0, f64::max);
  let tol = n.max(m) as f64 * f64::EPSILON * max_sv;
  let rank = svd.rank(tol);
  if rank < m {
    return Err(FitError::Singular { rank, required: m });
  }
  let solution = svd
    .solve(&rhs, tol)
    .map_err(|_| FitError::Singular { rank, required: m })?;
  let scaled_coefficients: Vec<f64> = solution.iter().copied().collect();

  // 换算回原始坐标: sum c'_k (offset + scale x)^k
  let mut coefficients = vec![0.0; m];
  for (k, ck) in scaled_coefficients.iter().enumerate() {
    for (j, cj) in coefficients.iter_mut().enumerate().take(k + 1) {
      *cj += ck * binomial(k, j) * offset.powi((k - j) as i32) * scale.powi(j as i32);
    }
  }

  if coefficients
    .iter()
    .chain(scaled_coefficients.iter())
    .any(|v| !v.is_finite())
  {
    return Err(FitError::NonFinite);
  }

  Ok(Polynomial {
    coefficients,
    scaled_coefficients,
    domain: [min, max],
    offset,
    scale,
  })
}
