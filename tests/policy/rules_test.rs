//! Rule set evaluation: priority, ties, default decision and taint gates.

use toolgate::policy::{PolicyRule, RuleSet, ToolMatcher};
use toolgate::types::{Decision, Tag, TagSet, TaintLevel, ToolIdentity};

fn by_name(glob: &str) -> ToolMatcher {
    ToolMatcher::new().with_name_globs([glob]).expect("valid glob")
}

fn by_tag(tag: Tag) -> ToolMatcher {
    ToolMatcher::new().with_tags_any([tag])
}

#[test]
fn no_match_yields_default_decision() {
    let rules = RuleSet::new(
        vec![PolicyRule::new(by_name("delete_*"), Decision::Deny)],
        Decision::Confirm,
    );
    let eval = rules.explain(
        &ToolIdentity::in_house("list_notes"),
        &TagSet::new(),
        TaintLevel::Trusted,
    );
    assert_eq!(eval.decision, Decision::Confirm);
    assert!(eval.rule.is_none());
}

#[test]
fn highest_priority_match_wins_regardless_of_position() {
    let rules = RuleSet::new(
        vec![
            PolicyRule::new(by_tag(Tag::ReadOnly), Decision::Allow).with_priority(10),
            PolicyRule::new(by_name("*"), Decision::Deny).with_priority(50),
        ],
        Decision::Allow,
    );
    let eval = rules.explain(
        &ToolIdentity::in_house("list_notes"),
        &TagSet::from([Tag::ReadOnly]),
        TaintLevel::Trusted,
    );
    assert_eq!(eval.decision, Decision::Deny);
    let matched = eval.rule.expect("a rule matched");
    assert_eq!(matched.index, 1);
    assert_eq!(matched.priority, 50);
}

#[test]
fn equal_priority_keeps_declaration_order() {
    let rules = RuleSet::new(
        vec![
            PolicyRule::new(by_name("*_notes"), Decision::Confirm)
                .with_priority(5)
                .with_description("first"),
            PolicyRule::new(by_name("list_*"), Decision::Allow)
                .with_priority(5)
                .with_description("second"),
        ],
        Decision::Deny,
    );
    let id = ToolIdentity::in_house("list_notes");

    // Repeated evaluation is deterministic.
    for _ in 0..10 {
        let eval = rules.explain(&id, &TagSet::new(), TaintLevel::Trusted);
        assert_eq!(eval.decision, Decision::Confirm);
        assert_eq!(eval.rule.map(|r| r.description), Some("first".to_owned()));
    }
}

#[test]
fn non_matching_high_priority_rule_does_not_shadow() {
    let rules = RuleSet::new(
        vec![
            PolicyRule::new(by_name("delete_*"), Decision::Deny).with_priority(100),
            PolicyRule::new(by_name("list_*"), Decision::Allow),
        ],
        Decision::Deny,
    );
    let decision = rules.evaluate(
        &ToolIdentity::in_house("list_notes"),
        &TagSet::new(),
        TaintLevel::Trusted,
    );
    assert_eq!(decision, Decision::Allow);
}

#[test]
fn taint_gated_rule_is_inactive_below_threshold() {
    let rules = RuleSet::new(
        vec![
            PolicyRule::new(by_tag(Tag::ExternalComm), Decision::Deny)
                .with_priority(100)
                .with_taint_threshold(TaintLevel::Untrusted),
            PolicyRule::new(by_tag(Tag::ExternalComm), Decision::Allow),
        ],
        Decision::Deny,
    );
    let id = ToolIdentity::in_house("send_email");
    let tags = TagSet::from([Tag::ExternalComm]);

    assert_eq!(rules.evaluate(&id, &tags, TaintLevel::Trusted), Decision::Allow);
    assert_eq!(
        rules.evaluate(&id, &tags, TaintLevel::PartiallyTainted),
        Decision::Allow
    );
    assert_eq!(rules.evaluate(&id, &tags, TaintLevel::Untrusted), Decision::Deny);
}

#[test]
fn threshold_is_inclusive() {
    let rule = PolicyRule::new(by_name("*"), Decision::Deny)
        .with_taint_threshold(TaintLevel::PartiallyTainted);
    assert!(!rule.is_active_at(TaintLevel::Trusted));
    assert!(rule.is_active_at(TaintLevel::PartiallyTainted));
    assert!(rule.is_active_at(TaintLevel::Untrusted));
}

#[test]
fn ordered_is_stable_by_descending_priority() {
    let rules = RuleSet::new(
        vec![
            PolicyRule::new(by_name("a"), Decision::Allow).with_priority(1),
            PolicyRule::new(by_name("b"), Decision::Allow).with_priority(7),
            PolicyRule::new(by_name("c"), Decision::Allow).with_priority(1),
            PolicyRule::new(by_name("d"), Decision::Deny)
                .with_priority(9)
                .with_taint_threshold(TaintLevel::Untrusted),
        ],
        Decision::Deny,
    );

    let trusted: Vec<usize> = rules
        .ordered(TaintLevel::Trusted)
        .into_iter()
        .map(|(i, _)| i)
        .collect();
    assert_eq!(trusted, vec![1, 0, 2]);

    let untrusted: Vec<usize> = rules
        .ordered(TaintLevel::Untrusted)
        .into_iter()
        .map(|(i, _)| i)
        .collect();
    assert_eq!(untrusted, vec![3, 1, 0, 2]);
}

#[test]
fn first_match_in_ordered_agrees_with_explain() {
    let rules = RuleSet::new(
        vec![
            PolicyRule::new(by_tag(Tag::ReadOnly), Decision::Allow).with_priority(3),
            PolicyRule::new(by_name("*_notes"), Decision::Confirm).with_priority(3),
            PolicyRule::new(by_tag(Tag::Destructive), Decision::Deny).with_priority(8),
            PolicyRule::new(by_name("list_*"), Decision::Deny).with_priority(-1),
        ],
        Decision::Deny,
    );
    let cases = [
        ("list_notes", TagSet::from([Tag::ReadOnly])),
        ("delete_note", TagSet::from([Tag::Destructive])),
        ("edit_notes", TagSet::from([Tag::StateChanging])),
        ("list_files", TagSet::new()),
        ("other", TagSet::new()),
    ];

    for (name, tags) in cases {
        let id = ToolIdentity::in_house(name);
        let expected = rules
            .ordered(TaintLevel::Trusted)
            .into_iter()
            .find(|(_, rule)| rule.matcher.matches(&id, &tags))
            .map_or(rules.default_decision, |(_, rule)| rule.decision);
        assert_eq!(
            rules.evaluate(&id, &tags, TaintLevel::Trusted),
            expected,
            "tool {name}"
        );
    }
}

#[test]
fn rule_display_includes_gate_and_description() {
    let rule = PolicyRule::new(by_name("fetch"), Decision::Deny)
        .with_priority(1000)
        .with_taint_threshold(TaintLevel::Untrusted)
        .with_description("no fetch after untrusted input");
    let shown = rule.to_string();
    assert!(shown.contains("deny"));
    assert!(shown.contains("names=[fetch]"));
    assert!(shown.contains("(taint >= untrusted)"));
    assert!(shown.ends_with("# no fetch after untrusted input"));
}
