//! Mutually exclusive event categories and the b-tag category.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{CategoryConfig, MemConfig};
use crate::event::Event;
use crate::stages::btag_lr::BTagLikelihoods;
use crate::stages::jets::{JetTagging, TaggingSource};
use crate::stages::stage::{Stage, StageContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "NOCAT")]
    NoCat,
    /// Single lepton, >= 6 jets, W mass inside the window
    #[serde(rename = "cat1")]
    Cat1,
    /// Single lepton, >= 6 jets, no W candidate
    #[serde(rename = "cat2")]
    Cat2,
    /// Single lepton, 5 jets: one W quark missing
    #[serde(rename = "cat3")]
    Cat3,
    /// Di-lepton, >= 4 jets
    #[serde(rename = "cat6")]
    Cat6,
}

impl Category {
    pub const ALL: [Category; 5] = [Category::NoCat, Category::Cat1, Category::Cat2, Category::Cat3, Category::Cat6];

    pub fn code(&self) -> i32 {
        match self {
            Category::NoCat => -1,
            Category::Cat1 => 1,
            Category::Cat2 => 2,
            Category::Cat3 => 3,
            Category::Cat6 => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::NoCat => "NOCAT",
            Category::Cat1 => "cat1",
            Category::Cat2 => "cat2",
            Category::Cat3 => "cat3",
            Category::Cat6 => "cat6",
        }
    }

    /// Categories where one W-decay quark is not reconstructed.
    pub fn misses_w_quark(&self) -> bool {
        matches!(self, Category::Cat2 | Category::Cat3)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BTagCategory {
    L,
    H,
}

impl BTagCategory {
    pub fn code(&self) -> i32 {
        match self {
            BTagCategory::L => 0,
            BTagCategory::H => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Categorization {
    pub category: Category,
    pub category_code: i32,
    pub btag_category: BTagCategory,
    pub btag_category_code: i32,
    /// Jets handed to the integration as W-decay quark candidates.
    pub w_candidates: Vec<usize>,
}

#[inline]
fn in_window(x: Option<f64>, (lo, hi): (f64, f64)) -> bool {
    matches!(x, Some(m) if m >= lo && m < hi)
}

/// Ordered category rules; the first matching rule wins.
///
/// # Examples
///
/// ```
/// use meanalysis::config::CategoryConfig;
/// use meanalysis::stages::category::{categorize, Category};
///
/// let conf = CategoryConfig::default();
/// assert_eq!(categorize(true, false, 6, Some(85.0), &conf), Category::Cat1);
/// assert_eq!(categorize(true, false, 6, Some(50.0), &conf), Category::Cat2);
/// ```
pub fn categorize(is_sl: bool, is_dl: bool, n_jets: usize, w_mass: Option<f64>, conf: &CategoryConfig) -> Category {
    if is_sl {
        if (n_jets == 6 && in_window(w_mass, conf.w_window_six_jets))
            || (n_jets > 6 && in_window(w_mass, conf.w_window_more_jets))
        {
            return Category::Cat1;
        }
        if n_jets >= 6 {
            return Category::Cat2;
        }
        if n_jets == 5 {
            return Category::Cat3;
        }
    } else if is_dl && n_jets >= 4 {
        return Category::Cat6;
    }
    Category::NoCat
}

/// `H` when the likelihood ratio clears the category threshold, or, for a
/// discriminant-based split, when at least four jets are tagged.
pub fn btag_category(
    category: Category,
    tagging: &JetTagging,
    lr: Option<&BTagLikelihoods>,
    mem: &MemConfig,
) -> BTagCategory {
    let high = match (tagging.source, lr) {
        (TaggingSource::LikelihoodRatio, Some(lr)) => lr.ratio() > mem.lr_cut(category),
        (TaggingSource::LikelihoodRatio, None) => false,
        (TaggingSource::Discriminant, _) => tagging.tagged.len() >= 4,
    };
    if high {
        BTagCategory::H
    } else {
        BTagCategory::L
    }
}

/// W-quark candidates for the integration: all untagged jets in cat3, none in cat6.
pub fn w_candidates(category: Category, tagging: &JetTagging, wtag_candidates: &[usize]) -> Vec<usize> {
    match category {
        Category::Cat3 => tagging.untagged.clone(),
        Category::Cat6 => Vec::new(),
        _ => wtag_candidates.to_vec(),
    }
}

#[derive(Clone, Debug)]
pub struct CategoryStage {
    categories: CategoryConfig,
    mem: MemConfig,
}

impl CategoryStage {
    pub fn new(categories: &CategoryConfig, mem: &MemConfig) -> Self {
        CategoryStage { categories: categories.clone(), mem: mem.clone() }
    }
}

impl Stage for CategoryStage {
    fn name(&self) -> &'static str {
        "category"
    }

    fn counter_names(&self) -> Vec<String> {
        Category::ALL.iter().map(|c| c.as_str().to_string()).collect()
    }

    fn process(&self, event: &mut Event, ctx: &mut StageContext<'_>) -> bool {
        let (leptons, jets, tagging, wtag) = match (
            event.leptons.get(),
            event.jets.get(),
            event.tagging.get(),
            event.wtag.get(),
        ) {
            (Some(l), Some(j), Some(t), Some(w)) => (l, j, t, w),
            _ => {
                let err = mecore::Error::InputInsufficient("upstream selection missing".into());
                ctx.record_failure(self.name(), &err);
                event.category.set(Err(err));
                return false;
            }
        };

        let category = categorize(leptons.is_sl, leptons.is_dl, jets.n_jets(), wtag.w_mass, &self.categories);
        let btag = btag_category(category, tagging, event.btag_lr.get(), &self.mem);
        let res = Categorization {
            category,
            category_code: category.code(),
            btag_category: btag,
            btag_category_code: btag.code(),
            w_candidates: w_candidates(category, tagging, &wtag.candidates),
        };

        ctx.counters.inc(self.name(), category.as_str());
        event.category.set(Ok(res));
        true
    }
}
