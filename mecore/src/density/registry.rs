//! Named discriminant density tables, grouped by table family.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algorithm::likelihood::RoleProbabilities;
use crate::density::table::{DensityTable, DensityTableSpec};
use crate::error::{Error, Result};

/// |eta| above which the forward discriminant table is used.
pub const ETA_BIN_SPLIT: f64 = 1.0;

/// True jet flavour a discriminant table describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flavour {
    #[serde(rename = "b")]
    B,
    #[serde(rename = "c")]
    C,
    #[serde(rename = "l")]
    L,
}

impl Flavour {
    pub const ALL: [Flavour; 3] = [Flavour::B, Flavour::C, Flavour::L];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flavour::B => "b",
            Flavour::C => "c",
            Flavour::L => "l",
        }
    }
}

/// Table family used to turn a discriminant value into a density.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PdfKind {
    /// Legacy tables, two |eta| bins, 1-D in the discriminant
    #[serde(rename = "old")]
    Legacy,
    /// Current tables, two |eta| bins, 1-D in the discriminant
    #[serde(rename = "new_eta_1bin")]
    EtaBinned,
    /// Current tables, 3-D in (pt, |eta|, discriminant)
    #[serde(rename = "new_pt_eta_bin_3d")]
    PtEta,
}

impl PdfKind {
    pub const ALL: [PdfKind; 3] = [PdfKind::Legacy, PdfKind::EtaBinned, PdfKind::PtEta];
}

impl fmt::Display for PdfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PdfKind::Legacy => "old",
            PdfKind::EtaBinned => "new_eta_1bin",
            PdfKind::PtEta => "new_pt_eta_bin_3d",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum EtaBin {
    Central,
    Forward,
    All,
}

impl EtaBin {
    fn of(eta: f64) -> Self {
        if eta.abs() > ETA_BIN_SPLIT {
            EtaBin::Forward
        } else {
            EtaBin::Central
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct TableKey {
    kind: PdfKind,
    flavour: Flavour,
    eta_bin: EtaBin,
}

/// On-disk layout: the legacy table set and the current one.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DensityTableFile {
    #[serde(default)]
    pub legacy: Vec<DensityTableSpec>,
    #[serde(default)]
    pub current: Vec<DensityTableSpec>,
}

/// Name of the table file entry backing `key`, and the set it lives in.
fn table_name(key: &TableKey) -> (&'static str, String) {
    let f = key.flavour.as_str();
    let set = match key.kind {
        PdfKind::Legacy => "legacy",
        PdfKind::EtaBinned | PdfKind::PtEta => "current",
    };
    let name = match key.eta_bin {
        EtaBin::Central => format!("csv_{}_Bin0__csv_rec", f),
        EtaBin::Forward => format!("csv_{}_Bin1__csv_rec", f),
        EtaBin::All => format!("csv_{}_pt_eta", f),
    };
    (set, name)
}

fn required_keys() -> Vec<TableKey> {
    let mut keys = Vec::new();
    for kind in PdfKind::ALL {
        for flavour in Flavour::ALL {
            match kind {
                PdfKind::Legacy | PdfKind::EtaBinned => {
                    keys.push(TableKey { kind, flavour, eta_bin: EtaBin::Central });
                    keys.push(TableKey { kind, flavour, eta_bin: EtaBin::Forward });
                }
                PdfKind::PtEta => keys.push(TableKey { kind, flavour, eta_bin: EtaBin::All }),
            }
        }
    }
    keys
}

/// All discriminant density tables, built once and shared read-only.
#[derive(Clone, Debug)]
pub struct DensityRegistry {
    tables: HashMap<TableKey, DensityTable>,
}

impl DensityRegistry {
    /// Build every table the b-tag likelihood needs. A missing table is fatal.
    pub fn from_file(file: &DensityTableFile) -> Result<Self> {
        let mut tables = HashMap::new();

        for key in required_keys() {
            let (set, name) = table_name(&key);
            let specs = if set == "legacy" { &file.legacy } else { &file.current };
            let spec = specs
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| Error::ConfigurationMissing(format!("{} density table '{}'", set, name)))?;

            let table = DensityTable::from_spec(spec)?;
            let expected_dim = if key.eta_bin == EtaBin::All { 3 } else { 1 };
            if table.dim() != expected_dim {
                return Err(Error::Validation(format!(
                    "{} density table '{}' must be {}-dimensional, got {}",
                    set,
                    name,
                    expected_dim,
                    table.dim()
                )));
            }
            tables.insert(key, table);
        }

        log::debug!("density registry built with {} tables", tables.len());
        Ok(DensityRegistry { tables })
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Density of discriminant value `disc` for a jet of the given flavour.
    pub fn probability(&self, flavour: Flavour, kind: PdfKind, pt: f64, eta: f64, disc: f64) -> Result<f64> {
        let eta_bin = match kind {
            PdfKind::Legacy | PdfKind::EtaBinned => EtaBin::of(eta),
            PdfKind::PtEta => EtaBin::All,
        };
        let key = TableKey { kind, flavour, eta_bin };
        let table = self
            .tables
            .get(&key)
            .ok_or_else(|| Error::ConfigurationMissing(format!("{} table for flavour {}", kind, flavour.as_str())))?;

        match kind {
            PdfKind::Legacy | PdfKind::EtaBinned => table.value(&[disc]),
            PdfKind::PtEta => table.value(&[pt, eta.abs(), disc]),
        }
    }

    /// (b, c, light) densities for one jet.
    pub fn role_probabilities(&self, kind: PdfKind, pt: f64, eta: f64, disc: f64) -> Result<RoleProbabilities> {
        Ok(RoleProbabilities::new(
            self.probability(Flavour::B, kind, pt, eta, disc)?,
            self.probability(Flavour::C, kind, pt, eta, disc)?,
            self.probability(Flavour::L, kind, pt, eta, disc)?,
        ))
    }

    /// A registry where every table is flat over its domain. Handy for tests and dry runs.
    pub fn uniform(n_bins: usize) -> Result<Self> {
        let mut file = DensityTableFile::default();
        let disc_axis: Vec<f64> = (0..=n_bins).map(|i| i as f64 / n_bins as f64).collect();
        for key in required_keys() {
            let (set, name) = table_name(&key);
            let spec = if key.eta_bin == EtaBin::All {
                DensityTableSpec {
                    name,
                    axes: vec![vec![0.0, 1.0e4], vec![0.0, 5.0], disc_axis.clone()],
                    contents: vec![1.0; n_bins],
                }
            } else {
                DensityTableSpec { name, axes: vec![disc_axis.clone()], contents: vec![1.0; n_bins] }
            };
            if set == "legacy" {
                file.legacy.push(spec);
            } else {
                file.current.push(spec);
            }
        }
        DensityRegistry::from_file(&file)
    }
}
