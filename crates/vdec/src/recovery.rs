//! Re-arming the address-translation unit after a hardware fault.
use tracing::{info, warn};
use vdec_core::prelude::DecoderMetrics;
use vdec_platform::prelude::TranslationDomain;

/// Bounce the device through `empty` and back to `live`, reloading the translation tables.
///
/// Does nothing unless both domains exist. Only the single job-completion
/// claimant may call this.
pub(crate) fn restore_translation(
    live: Option<&dyn TranslationDomain>,
    empty: Option<&dyn TranslationDomain>,
    metrics: &DecoderMetrics,
) {
    let (Some(live), Some(empty)) = (live, empty) else {
        return;
    };
    info!(domain = live.name(), "restoring translation after fault");
    if let Err(err) = empty.attach() {
        warn!(error = %err, "attaching empty translation domain failed");
    }
    empty.detach();
    if let Err(err) = live.attach() {
        warn!(error = %err, "re-attaching translation domain failed");
    }
    metrics.recovery();
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdec_platform::prelude::{DomainEvent, DomainEventLog, SimDomain};

    #[test]
    fn bounces_through_the_empty_domain() {
        let log = DomainEventLog::default();
        let live = SimDomain::with_event_log("live", 0x1000, log.clone());
        let empty = SimDomain::with_event_log("empty", 0x1000, log.clone());
        let metrics = DecoderMetrics::default();
        restore_translation(Some(&live), Some(&empty), &metrics);
        assert_eq!(
            *log.lock(),
            vec![
                DomainEvent::Attach("empty".into()),
                DomainEvent::Detach("empty".into()),
                DomainEvent::Attach("live".into()),
            ]
        );
        assert!(live.is_attached());
        assert_eq!(metrics.snapshot().recoveries, 1);
    }

    #[test]
    fn skipped_without_an_empty_domain() {
        let live = SimDomain::new("live", 0x1000);
        let metrics = DecoderMetrics::default();
        restore_translation(Some(&live), None, &metrics);
        assert!(live.events().is_empty());
        assert_eq!(metrics.snapshot().recoveries, 0);
    }
}
