//! Pure validators and correctors for classification-engine output.
//!
//! The engine's response is an untrusted proposal. Everything here is free
//! of I/O so the invariants can be unit-tested exhaustively: the worker
//! runs these checks before persisting any result, re-asks the engine once
//! with the violations spelled out, and falls back to deterministic
//! recomputation when the second answer is still inconsistent.

use std::collections::BTreeSet;

use crate::models::activity::{
    ActivityEntry, ActivityReport, Category, SessionSummary, Streaks, Transition,
};
use crate::models::review::{
    DailySummary, ReviewReport, Trend, UserGoals, ZoneOutEvent, ZoneOutProfile,
};

// ── Activity ─────────────────────────────────────────────────────────

/// Check the cross-field invariants of an activity report. Returns a list
/// of human-readable violations, empty when the report is consistent.
pub fn check_activity_report(report: &ActivityReport, pct_tolerance: f64) -> Vec<String> {
    let mut violations = Vec::new();
    let summary = &report.session_summary;

    if report.activities.is_empty() {
        violations.push("activities array is empty".to_string());
        return violations;
    }

    let total = report.activities.len() as u32;
    if summary.total_captures != total {
        violations.push(format!(
            "session_summary.total_captures is {} but activities has {} entries",
            summary.total_captures, total
        ));
    }

    if summary.aligned_captures + summary.drifting_captures != summary.total_captures {
        violations.push(format!(
            "aligned_captures ({}) + drifting_captures ({}) != total_captures ({})",
            summary.aligned_captures, summary.drifting_captures, summary.total_captures
        ));
    }

    if (summary.aligned_pct + summary.drifting_pct - 100.0).abs() > pct_tolerance {
        violations.push(format!(
            "aligned_pct ({}) + drifting_pct ({}) does not sum to 100",
            summary.aligned_pct, summary.drifting_pct
        ));
    }

    let known_captures: BTreeSet<&str> = report
        .activities
        .iter()
        .map(|a| a.capture.as_str())
        .collect();
    for transition in &report.transitions {
        if !known_captures.contains(transition.at_capture.as_str()) {
            violations.push(format!(
                "transition at_capture \"{}\" does not match any activity",
                transition.at_capture
            ));
        }
    }

    if let Some(last) = report.activities.last() {
        if report.streaks.ended_on != last.category {
            violations.push(format!(
                "streaks.ended_on is {} but the last capture is {}",
                report.streaks.ended_on, last.category
            ));
        }
    }

    violations
}

/// Deterministically rebuild summary, streaks and transitions from the
/// per-capture classifications. Used as the final fallback so an
/// internally inconsistent report is never persisted.
pub fn recompute_activity_report(report: &ActivityReport) -> ActivityReport {
    let mut rebuilt = report.clone();
    rebuilt.session_summary = recompute_session_summary(&report.activities);
    rebuilt.streaks = recompute_streaks(&report.activities);
    rebuilt.transitions = recompute_transitions(&report.activities, &report.transitions);
    rebuilt
}

pub fn recompute_session_summary(activities: &[ActivityEntry]) -> SessionSummary {
    let total = activities.len() as u32;
    let aligned = activities
        .iter()
        .filter(|a| a.category == Category::Aligned)
        .count() as u32;
    let drifting = total - aligned;

    let (aligned_pct, drifting_pct) = if total == 0 {
        (0.0, 0.0)
    } else {
        let aligned_pct = (f64::from(aligned) / f64::from(total) * 100.0).round();
        (aligned_pct, 100.0 - aligned_pct)
    };

    SessionSummary {
        total_captures: total,
        aligned_captures: aligned,
        drifting_captures: drifting,
        aligned_pct,
        drifting_pct,
    }
}

pub fn recompute_streaks(activities: &[ActivityEntry]) -> Streaks {
    let mut longest_aligned = 0u32;
    let mut longest_drifting = 0u32;
    let mut run = 0u32;
    let mut run_category = None;

    for entry in activities {
        if Some(entry.category) == run_category {
            run += 1;
        } else {
            run = 1;
            run_category = Some(entry.category);
        }
        match entry.category {
            Category::Aligned => longest_aligned = longest_aligned.max(run),
            Category::Drifting => longest_drifting = longest_drifting.max(run),
        }
    }

    Streaks {
        longest_aligned,
        longest_drifting,
        ended_on: activities
            .last()
            .map(|a| a.category)
            .unwrap_or(Category::Drifting),
    }
}

/// Walk the activities in order and record every category flip. The
/// engine's trigger text is kept when it described the same flip;
/// otherwise a trigger is synthesized from the app names.
pub fn recompute_transitions(
    activities: &[ActivityEntry],
    proposed: &[Transition],
) -> Vec<Transition> {
    let mut transitions = Vec::new();
    for window in activities.windows(2) {
        let (prev, current) = (&window[0], &window[1]);
        if prev.category == current.category {
            continue;
        }
        let trigger = proposed
            .iter()
            .find(|t| {
                t.at_capture == current.capture && t.from == prev.category && t.to == current.category
            })
            .map(|t| t.trigger.clone())
            .unwrap_or_else(|| format!("Switched from {} to {}", prev.app_name, current.app_name));
        transitions.push(Transition {
            at_capture: current.capture.clone(),
            from: prev.category,
            to: current.category,
            trigger,
        });
    }
    transitions
}

// ── Review ───────────────────────────────────────────────────────────

/// Time-weighted weekly totals recomputed from the raw daily summaries.
pub struct WeeklyTotals {
    pub total_active_minutes: f64,
    pub days_active: u32,
    pub aligned_pct: f64,
    pub drifting_pct: f64,
}

pub fn recompute_weekly_totals(daily: &[DailySummary]) -> WeeklyTotals {
    let total_active_minutes: f64 = daily.iter().map(|d| d.total_minutes).sum();
    let aligned_minutes: f64 = daily.iter().map(|d| d.aligned_minutes).sum();
    let drifting_minutes: f64 = daily.iter().map(|d| d.drifting_minutes).sum();
    let days_active = daily.iter().filter(|d| d.total_minutes > 0.0).count() as u32;

    let classified = aligned_minutes + drifting_minutes;
    let (aligned_pct, drifting_pct) = if classified > 0.0 {
        let aligned_pct = (aligned_minutes / classified * 100.0).round();
        (aligned_pct, 100.0 - aligned_pct)
    } else {
        (0.0, 0.0)
    };

    WeeklyTotals {
        total_active_minutes,
        days_active,
        aligned_pct,
        drifting_pct,
    }
}

/// The trend the delta actually supports.
pub fn trend_from_delta(current_aligned_pct: f64, previous_aligned_pct: f64, tolerance: f64) -> Trend {
    let delta = current_aligned_pct - previous_aligned_pct;
    if delta > tolerance {
        Trend::Improving
    } else if delta < -tolerance {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Correct a review report in place against the raw input data. The
/// engine's arithmetic, zone-out categorization and trend label are all
/// overridden where they diverge from what the input mechanically implies.
pub fn correct_review_report(
    report: &mut ReviewReport,
    goals: &UserGoals,
    daily: &[DailySummary],
    events: &[ZoneOutEvent],
    previous_aligned_pct: Option<f64>,
    pct_tolerance: f64,
    trend_tolerance: f64,
) {
    let totals = recompute_weekly_totals(daily);
    let summary = &mut report.weekly_summary;

    if (summary.aligned_pct - totals.aligned_pct).abs() > pct_tolerance
        || (summary.drifting_pct - totals.drifting_pct).abs() > pct_tolerance
    {
        summary.aligned_pct = totals.aligned_pct;
        summary.drifting_pct = totals.drifting_pct;
    }
    if (summary.total_active_minutes - totals.total_active_minutes).abs() > pct_tolerance {
        summary.total_active_minutes = totals.total_active_minutes;
    }
    summary.days_active = totals.days_active;

    if let Some(previous) = previous_aligned_pct {
        let expected = trend_from_delta(summary.aligned_pct, previous, trend_tolerance);
        if summary.trend != expected {
            summary.trend = expected;
        }
    }

    report.zone_out_profile = correct_zone_out_profile(&report.zone_out_profile, goals, events);

    report.observations.truncate(4);
}

/// Rebuild the zone-out profile from the raw data, trusting the previous
/// lists and this week's observed events over the engine's categorization:
/// - persistent but not previously listed -> emerging
/// - persistent but not observed this week -> resolved
/// - emerging but previously listed -> persistent (observed) or resolved
/// - resolved but never previously listed -> dropped
/// - previously listed patterns the engine forgot -> persistent or resolved
pub fn correct_zone_out_profile(
    raw: &ZoneOutProfile,
    goals: &UserGoals,
    events: &[ZoneOutEvent],
) -> ZoneOutProfile {
    let input_content: BTreeSet<&str> = goals.content_zone_outs.iter().map(String::as_str).collect();
    let input_behavior: BTreeSet<&str> =
        goals.behavior_zone_outs.iter().map(String::as_str).collect();
    let input_all: BTreeSet<&str> = input_content.union(&input_behavior).copied().collect();

    let observed_content: BTreeSet<&str> = events
        .iter()
        .filter(|e| e.kind == "content")
        .map(|e| e.pattern.as_str())
        .collect();
    let observed_behavior: BTreeSet<&str> = events
        .iter()
        .filter(|e| e.kind == "behavior")
        .map(|e| e.pattern.as_str())
        .collect();
    let observed_all: BTreeSet<&str> = observed_content.union(&observed_behavior).copied().collect();

    let engine_content: BTreeSet<&str> = raw.content_zone_outs.iter().map(String::as_str).collect();
    let engine_behavior: BTreeSet<&str> =
        raw.behavior_zone_outs.iter().map(String::as_str).collect();

    let mut persistent: BTreeSet<&str> = BTreeSet::new();
    let mut emerging: BTreeSet<&str> = BTreeSet::new();
    let mut resolved: BTreeSet<&str> = BTreeSet::new();

    // Persistent must have existed before AND be observed this week.
    for pattern in raw.persistent.iter().map(String::as_str) {
        if !input_all.contains(pattern) {
            emerging.insert(pattern);
        } else if !observed_all.contains(pattern) {
            resolved.insert(pattern);
        } else {
            persistent.insert(pattern);
        }
    }

    // Emerging must be new.
    for pattern in raw.emerging.iter().map(String::as_str) {
        if input_all.contains(pattern) {
            if observed_all.contains(pattern) {
                persistent.insert(pattern);
            } else {
                resolved.insert(pattern);
            }
        } else {
            emerging.insert(pattern);
        }
    }

    // Resolved must have existed before; anything else is dropped.
    for pattern in raw.resolved.iter().map(String::as_str) {
        if !input_all.contains(pattern) {
            continue;
        }
        if observed_all.contains(pattern) {
            persistent.insert(pattern);
        } else {
            resolved.insert(pattern);
        }
    }

    // Previously listed patterns the engine omitted entirely.
    for pattern in input_all.iter().copied() {
        if !persistent.contains(pattern) && !resolved.contains(pattern) {
            if observed_all.contains(pattern) {
                persistent.insert(pattern);
            } else {
                resolved.insert(pattern);
            }
        }
    }

    // Active patterns split by type: input type wins, then the observed
    // event type, then the engine's placement, then content.
    let mut content = BTreeSet::new();
    let mut behavior = BTreeSet::new();
    for pattern in persistent.union(&emerging).copied() {
        if input_content.contains(pattern) || observed_content.contains(pattern) {
            content.insert(pattern);
        } else if input_behavior.contains(pattern) || observed_behavior.contains(pattern) {
            behavior.insert(pattern);
        } else if engine_behavior.contains(pattern) && !engine_content.contains(pattern) {
            behavior.insert(pattern);
        } else {
            content.insert(pattern);
        }
    }

    let to_vec = |set: BTreeSet<&str>| set.into_iter().map(String::from).collect::<Vec<_>>();
    ZoneOutProfile {
        content_zone_outs: to_vec(content),
        behavior_zone_outs: to_vec(behavior),
        emerging: to_vec(emerging),
        persistent: to_vec(persistent),
        resolved: to_vec(resolved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::activity::UpdatedScore;

    fn entry(capture: &str, category: Category) -> ActivityEntry {
        ActivityEntry {
            capture: capture.to_string(),
            app: "com.example.app".to_string(),
            app_name: "Example".to_string(),
            category,
            description: "test".to_string(),
            zone_out_match: None,
        }
    }

    fn report(activities: Vec<ActivityEntry>, summary: SessionSummary) -> ActivityReport {
        let streaks = recompute_streaks(&activities);
        ActivityReport {
            transitions: recompute_transitions(&activities, &[]),
            streaks,
            activities,
            session_summary: summary,
            updated_score: UpdatedScore {
                aligned_pct: 50.0,
                drifting_pct: 50.0,
            },
            feedback: "ok".to_string(),
            excluded_captures: 0,
        }
    }

    #[test]
    fn consistent_report_passes() {
        let activities = vec![
            entry("001", Category::Aligned),
            entry("002", Category::Drifting),
            entry("003", Category::Drifting),
        ];
        let summary = recompute_session_summary(&activities);
        let report = report(activities, summary);
        assert!(check_activity_report(&report, 1.0).is_empty());
    }

    #[test]
    fn count_mismatch_is_flagged() {
        let activities = vec![
            entry("001", Category::Aligned),
            entry("002", Category::Drifting),
        ];
        let report = report(
            activities,
            SessionSummary {
                total_captures: 2,
                aligned_captures: 2,
                drifting_captures: 1,
                aligned_pct: 50.0,
                drifting_pct: 50.0,
            },
        );
        let violations = check_activity_report(&report, 1.0);
        assert!(violations.iter().any(|v| v.contains("aligned_captures")));
    }

    #[test]
    fn percentages_must_sum_to_100() {
        let activities = vec![
            entry("001", Category::Aligned),
            entry("002", Category::Drifting),
        ];
        let report = report(
            activities,
            SessionSummary {
                total_captures: 2,
                aligned_captures: 1,
                drifting_captures: 1,
                aligned_pct: 50.0,
                drifting_pct: 40.0,
            },
        );
        let violations = check_activity_report(&report, 1.0);
        assert!(violations.iter().any(|v| v.contains("100")));
    }

    #[test]
    fn unknown_transition_capture_is_flagged() {
        let activities = vec![
            entry("001", Category::Aligned),
            entry("002", Category::Drifting),
        ];
        let summary = recompute_session_summary(&activities);
        let mut r = report(activities, summary);
        r.transitions.push(Transition {
            at_capture: "099".to_string(),
            from: Category::Aligned,
            to: Category::Drifting,
            trigger: "made up".to_string(),
        });
        let violations = check_activity_report(&r, 1.0);
        assert!(violations.iter().any(|v| v.contains("099")));
    }

    #[test]
    fn ended_on_must_match_last_capture() {
        let activities = vec![
            entry("001", Category::Drifting),
            entry("002", Category::Aligned),
        ];
        let summary = recompute_session_summary(&activities);
        let mut r = report(activities, summary);
        r.streaks.ended_on = Category::Drifting;
        let violations = check_activity_report(&r, 1.0);
        assert!(violations.iter().any(|v| v.contains("ended_on")));
    }

    #[test]
    fn recompute_yields_consistent_report() {
        let activities = vec![
            entry("001", Category::Aligned),
            entry("002", Category::Aligned),
            entry("003", Category::Drifting),
            entry("004", Category::Aligned),
            entry("005", Category::Drifting),
            entry("006", Category::Drifting),
            entry("007", Category::Drifting),
        ];
        let broken = report(
            activities,
            SessionSummary {
                total_captures: 99,
                aligned_captures: 0,
                drifting_captures: 1,
                aligned_pct: 10.0,
                drifting_pct: 10.0,
            },
        );
        let fixed = recompute_activity_report(&broken);

        assert!(check_activity_report(&fixed, 1.0).is_empty());
        let s = &fixed.session_summary;
        assert_eq!(s.total_captures, 7);
        assert_eq!(s.aligned_captures + s.drifting_captures, s.total_captures);
        assert!((s.aligned_pct + s.drifting_pct - 100.0).abs() <= 1.0);
        assert_eq!(fixed.streaks.longest_aligned, 2);
        assert_eq!(fixed.streaks.longest_drifting, 3);
        assert_eq!(fixed.streaks.ended_on, Category::Drifting);
        // Flips at 003, 004 and 005.
        assert_eq!(fixed.transitions.len(), 3);
        assert_eq!(fixed.transitions[0].at_capture, "003");
    }

    #[test]
    fn weekly_totals_are_time_weighted() {
        let daily = vec![
            DailySummary {
                date: "2026-08-24".into(),
                total_minutes: 300.0,
                aligned_minutes: 30.0,
                drifting_minutes: 270.0,
            },
            DailySummary {
                date: "2026-08-25".into(),
                total_minutes: 100.0,
                aligned_minutes: 90.0,
                drifting_minutes: 10.0,
            },
            DailySummary {
                date: "2026-08-26".into(),
                total_minutes: 0.0,
                aligned_minutes: 0.0,
                drifting_minutes: 0.0,
            },
        ];
        let totals = recompute_weekly_totals(&daily);
        assert_eq!(totals.total_active_minutes, 400.0);
        assert_eq!(totals.days_active, 2);
        // 120 aligned of 400 classified minutes, not the per-day average.
        assert_eq!(totals.aligned_pct, 30.0);
        assert_eq!(totals.drifting_pct, 70.0);
    }

    #[test]
    fn trend_agrees_with_delta_sign() {
        assert_eq!(trend_from_delta(55.0, 40.0, 1.0), Trend::Improving);
        assert_eq!(trend_from_delta(40.0, 55.0, 1.0), Trend::Declining);
        assert_eq!(trend_from_delta(50.5, 50.0, 1.0), Trend::Stable);
    }

    fn goals(content: &[&str], behavior: &[&str]) -> UserGoals {
        UserGoals {
            content_zone_outs: content.iter().map(|s| s.to_string()).collect(),
            behavior_zone_outs: behavior.iter().map(|s| s.to_string()).collect(),
            extra: Default::default(),
        }
    }

    fn event(pattern: &str, kind: &str) -> ZoneOutEvent {
        ZoneOutEvent {
            pattern: pattern.to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn zone_out_set_laws_hold() {
        // previous = {A, B}, current = {B, C}
        let goals = goals(&["a", "b"], &[]);
        let events = vec![event("b", "content"), event("c", "content")];
        let raw = ZoneOutProfile {
            content_zone_outs: vec!["b".into(), "c".into()],
            behavior_zone_outs: vec![],
            emerging: vec!["c".into()],
            persistent: vec!["b".into()],
            resolved: vec!["a".into()],
        };
        let corrected = correct_zone_out_profile(&raw, &goals, &events);
        assert_eq!(corrected.resolved, vec!["a"]);
        assert_eq!(corrected.persistent, vec!["b"]);
        assert_eq!(corrected.emerging, vec!["c"]);
        assert_eq!(corrected.content_zone_outs, vec!["b", "c"]);
    }

    #[test]
    fn miscategorized_profile_is_rebuilt() {
        let goals = goals(&["a", "b"], &["late_night"]);
        let events = vec![event("b", "content"), event("c", "content")];
        // Engine got every category wrong.
        let raw = ZoneOutProfile {
            content_zone_outs: vec!["a".into()],
            behavior_zone_outs: vec![],
            emerging: vec!["b".into()],
            persistent: vec!["c".into(), "late_night".into()],
            resolved: vec!["never_listed".into()],
        };
        let corrected = correct_zone_out_profile(&raw, &goals, &events);
        assert_eq!(corrected.resolved, vec!["a", "late_night"]);
        assert_eq!(corrected.persistent, vec!["b"]);
        assert_eq!(corrected.emerging, vec!["c"]);
        // "never_listed" was not in the previous lists: dropped entirely.
        assert!(!corrected.resolved.contains(&"never_listed".to_string()));
    }

    #[test]
    fn forgotten_input_patterns_are_recovered() {
        let goals = goals(&["a"], &["b"]);
        let events = vec![event("b", "behavior")];
        let raw = ZoneOutProfile::default();
        let corrected = correct_zone_out_profile(&raw, &goals, &events);
        assert_eq!(corrected.resolved, vec!["a"]);
        assert_eq!(corrected.persistent, vec!["b"]);
        assert_eq!(corrected.behavior_zone_outs, vec!["b"]);
        assert!(corrected.content_zone_outs.is_empty());
    }

    #[test]
    fn review_correction_overrides_engine_numbers() {
        use crate::models::review::WeeklySummary;

        let daily = vec![
            DailySummary {
                date: "2026-08-24".into(),
                total_minutes: 200.0,
                aligned_minutes: 110.0,
                drifting_minutes: 90.0,
            },
            DailySummary {
                date: "2026-08-25".into(),
                total_minutes: 200.0,
                aligned_minutes: 110.0,
                drifting_minutes: 90.0,
            },
        ];
        let mut report = ReviewReport {
            weekly_summary: WeeklySummary {
                total_active_minutes: 9999.0,
                days_active: 7,
                aligned_pct: 20.0,
                drifting_pct: 80.0,
                trend: Trend::Declining,
                trend_detail: "made up".into(),
            },
            zone_out_profile: ZoneOutProfile::default(),
            observations: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()],
            feedback: "ok".into(),
        };
        correct_review_report(
            &mut report,
            &UserGoals::default(),
            &daily,
            &[],
            Some(40.0),
            1.0,
            1.0,
        );
        let summary = &report.weekly_summary;
        assert_eq!(summary.aligned_pct, 55.0);
        assert_eq!(summary.drifting_pct, 45.0);
        assert_eq!(summary.total_active_minutes, 400.0);
        assert_eq!(summary.days_active, 2);
        // 40 -> 55 must resolve to improving regardless of the engine label.
        assert_eq!(summary.trend, Trend::Improving);
        assert_eq!(report.observations.len(), 4);
    }
}
