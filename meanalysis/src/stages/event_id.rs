use std::collections::HashSet;

use crate::config::GeneralConfig;
use crate::event::Event;
use crate::stages::stage::{Stage, StageContext};

/// Keeps only whitelisted (run, lumi, event) triples; passes everything without a list.
#[derive(Clone, Debug, Default)]
pub struct EventIdFilter {
    whitelist: Option<HashSet<(u32, u32, u64)>>,
}

impl EventIdFilter {
    pub fn new(conf: &GeneralConfig) -> Self {
        EventIdFilter {
            whitelist: conf.event_whitelist.as_ref().map(|ids| ids.iter().copied().collect()),
        }
    }

    pub fn accepts(&self, id: (u32, u32, u64)) -> bool {
        match &self.whitelist {
            Some(ids) => ids.contains(&id),
            None => true,
        }
    }
}

impl Stage for EventIdFilter {
    fn name(&self) -> &'static str {
        "event_id"
    }

    fn process(&self, event: &mut Event, _ctx: &mut StageContext<'_>) -> bool {
        let id = event.id();
        let passes = self.accepts(id);
        if passes && self.whitelist.is_some() {
            log::debug!("whitelisted event {:?}", id);
        }
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_whitelist_accepts_all() {
        let f = EventIdFilter::new(&GeneralConfig::default());
        assert!(f.accepts((1, 1, 1)));
    }

    #[test]
    fn test_whitelist() {
        let conf = GeneralConfig { event_whitelist: Some(vec![(1, 10, 100), (2, 20, 200)]) };
        let f = EventIdFilter::new(&conf);
        assert!(f.accepts((2, 20, 200)));
        assert!(!f.accepts((2, 20, 201)));
    }
}
