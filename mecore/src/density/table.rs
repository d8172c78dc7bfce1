//! Binned probability densities with clamped lookup.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bin edges of one table axis, strictly increasing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub edges: Vec<f64>,
}

impl Axis {
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::Validation(format!(
                "axis requires at least 2 edges, got {}",
                edges.len()
            )));
        }
        for (i, w) in edges.windows(2).enumerate() {
            if !(w[0].is_finite() && w[1].is_finite()) || w[0] >= w[1] {
                return Err(Error::Validation(format!(
                    "axis edges must be finite and strictly increasing, got edges[{}]={} and edges[{}]={}",
                    i,
                    w[0],
                    i + 1,
                    w[1]
                )));
            }
        }
        Ok(Axis { edges })
    }

    /// Evenly spaced bins over [lo, hi].
    pub fn uniform(n_bins: usize, lo: f64, hi: f64) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::Validation("axis requires at least one bin".into()));
        }
        let width = (hi - lo) / n_bins as f64;
        let edges = (0..=n_bins).map(|i| lo + width * i as f64).collect();
        Axis::new(edges)
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    #[inline]
    pub fn lo(&self) -> f64 {
        self.edges[0]
    }

    #[inline]
    pub fn hi(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Bin holding `x`; values outside the axis go to the first or last bin.
    #[inline]
    pub fn bin_clamped(&self, x: f64) -> usize {
        let n = self.n_bins();
        if !(x > self.lo()) {
            return 0;
        }
        if x >= self.hi() {
            return n - 1;
        }
        // number of edges <= x, minus one
        let k = self.edges.partition_point(|e| *e <= x);
        k.saturating_sub(1).min(n - 1)
    }
}

/// Serialized form of a table: axis edges plus row-major bin contents (last axis fastest).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DensityTableSpec {
    pub name: String,
    pub axes: Vec<Vec<f64>>,
    pub contents: Vec<f64>,
}

/// Immutable binned probability table, normalised so the bin contents sum to one.
#[derive(Clone, Debug)]
pub struct DensityTable {
    name: String,
    axes: Vec<Axis>,
    density: Vec<f64>,
}

impl DensityTable {
    /// Validate and normalise raw bin contents.
    pub fn new(name: impl Into<String>, axes: Vec<Axis>, contents: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if axes.is_empty() {
            return Err(Error::Validation(format!("table '{}' has no axes", name)));
        }
        let expected: usize = axes.iter().map(|a| a.n_bins()).product();
        if contents.len() != expected {
            return Err(Error::Validation(format!(
                "table '{}' content length mismatch: expected {}, got {}",
                name,
                expected,
                contents.len()
            )));
        }
        for (i, w) in contents.iter().enumerate() {
            if !w.is_finite() || *w < 0.0 {
                return Err(Error::Validation(format!(
                    "table '{}' content[{}] must be finite and >=0, got {}",
                    name, i, w
                )));
            }
        }
        let total: f64 = contents.iter().sum();
        if !(total > 0.0) {
            return Err(Error::Validation(format!(
                "table '{}' has zero total content",
                name
            )));
        }

        let density = contents.into_iter().map(|w| w / total).collect();
        Ok(DensityTable { name, axes, density })
    }

    pub fn from_spec(spec: &DensityTableSpec) -> Result<Self> {
        let axes = spec
            .axes
            .iter()
            .cloned()
            .map(Axis::new)
            .collect::<Result<Vec<_>>>()?;
        DensityTable::new(spec.name.clone(), axes, spec.contents.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dim(&self) -> usize {
        self.axes.len()
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Sum of all bins; 1 up to rounding.
    pub fn integral(&self) -> f64 {
        self.density.iter().sum()
    }

    /// Density of the bin containing `coords`, each coordinate clamped into its axis.
    pub fn value(&self, coords: &[f64]) -> Result<f64> {
        if coords.len() != self.axes.len() {
            return Err(Error::Validation(format!(
                "table '{}' is {}-dimensional, got {} coordinates",
                self.name,
                self.axes.len(),
                coords.len()
            )));
        }
        let mut flat = 0usize;
        for (axis, &x) in self.axes.iter().zip(coords) {
            flat = flat * axis.n_bins() + axis.bin_clamped(x);
        }
        Ok(self.density[flat])
    }
}
