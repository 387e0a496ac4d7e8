//! Taint transitions and monotonicity.

use toolgate::policy::taint::escalation_for;
use toolgate::policy::TaintTracker;
use toolgate::types::{Tag, TagSet, TaintLevel};

#[test]
fn untrusted_output_escalates() {
    let mut tracker = TaintTracker::default();
    assert_eq!(tracker.level(), TaintLevel::Trusted);

    let changed = tracker.observe_output(&TagSet::from([Tag::ExternalComm, Tag::OutputUntrusted]));
    assert_eq!(changed, Some(TaintLevel::Untrusted));
    assert_eq!(tracker.level(), TaintLevel::Untrusted);
}

#[test]
fn unspecified_trust_escalates() {
    assert_eq!(
        escalation_for(&TagSet::from([Tag::TrustUnspecified])),
        Some(TaintLevel::Untrusted)
    );
}

#[test]
fn trusted_output_does_not_escalate() {
    let mut tracker = TaintTracker::default();
    assert_eq!(
        tracker.observe_output(&TagSet::from([Tag::ReadOnly, Tag::OutputTrusted])),
        None
    );
    assert_eq!(tracker.level(), TaintLevel::Trusted);
}

#[test]
fn output_trusted_wins_over_untrusted_tags() {
    let tags = TagSet::from([Tag::OutputTrusted, Tag::OutputUntrusted]);
    assert_eq!(escalation_for(&tags), None);
}

#[test]
fn no_trust_tag_means_no_escalation() {
    assert_eq!(escalation_for(&TagSet::from([Tag::ReadOnly])), None);
    assert_eq!(escalation_for(&TagSet::new()), None);
}

#[test]
fn level_never_decreases() {
    let mut tracker = TaintTracker::starting_at(TaintLevel::Untrusted);
    assert!(!tracker.escalate(TaintLevel::Trusted));
    assert!(!tracker.escalate(TaintLevel::PartiallyTainted));
    assert_eq!(tracker.observe_output(&TagSet::from([Tag::OutputTrusted])), None);
    assert_eq!(tracker.level(), TaintLevel::Untrusted);
}

#[test]
fn partial_taint_rises_to_untrusted() {
    let mut tracker = TaintTracker::starting_at(TaintLevel::PartiallyTainted);
    assert_eq!(
        tracker.observe_output(&TagSet::from([Tag::OutputUntrusted])),
        Some(TaintLevel::Untrusted)
    );
    // Already there: no change reported.
    assert_eq!(tracker.observe_output(&TagSet::from([Tag::OutputUntrusted])), None);
}

#[test]
fn levels_are_ordered() {
    assert!(TaintLevel::Trusted < TaintLevel::PartiallyTainted);
    assert!(TaintLevel::PartiallyTainted < TaintLevel::Untrusted);
}
