//! Markdown renderings of group state for notifications.

use std::fmt::Write as _;

use crate::config::GroupConfig;
use crate::plan::{Plan, PlanState};

/// Render the current assignments and health of a group.
pub fn render_state(cfg: &GroupConfig, state: &PlanState) -> String {
    render(cfg, state, None)
}

/// Render a plan that is about to be executed, with the state it was
/// computed from.
pub fn render_plan_execution(cfg: &GroupConfig, state: &PlanState, plan: &Plan) -> String {
    render(cfg, state, Some(plan))
}

fn render(cfg: &GroupConfig, state: &PlanState, plan: Option<&Plan>) -> String {
    let mut out = String::new();

    if let Some(plan) = plan {
        let _ = writeln!(
            out,
            ":clipboard: Executing plan `{}` for group **{}** (`{}`):",
            plan.id, cfg.display_name, cfg.id
        );
        for action in &plan.actions {
            let server_name = state
                .servers
                .get(&action.server_id)
                .map(|server| server.resource.name.as_str())
                .unwrap_or("<unknown>");
            let flip_name = state
                .floating_ips
                .get(&action.floating_ip_id)
                .map(|flip| flip.name.as_str())
                .unwrap_or("<unknown>");
            let _ = writeln!(
                out,
                "- `{}` ({}) → `{}` ({})",
                flip_name, action.floating_ip_id, server_name, action.server_id
            );
        }
        let _ = writeln!(out);
    }

    let to_be_reassigned = plan.map(Plan::to_be_reassigned).unwrap_or_default();
    let by_server = state.floating_ips_by_server();

    let _ = writeln!(out, "**Servers**");
    for server in state.servers_sorted() {
        let mut assigned = String::new();
        if let Some(flips) = by_server.get(server.resource.id.as_str()) {
            for flip in flips {
                let marker = if to_be_reassigned.contains(flip.id.as_str()) {
                    " (moving)"
                } else {
                    ""
                };
                let _ = write!(assigned, " `{}`{}", flip.name, marker);
            }
        }
        let _ = writeln!(
            out,
            "- `{}` ({}) in `{}`: _{}_{}",
            server.resource.name,
            server.resource.id,
            server.resource.location,
            server.status(),
            assigned
        );
    }

    let unassigned = state.unassigned_floating_ips();
    if !unassigned.is_empty() {
        let names: Vec<_> = unassigned
            .iter()
            .map(|flip| format!("`{}`", flip.name))
            .collect();
        let _ = writeln!(out, "Unassigned floating IPs: {}", names.join(", "));
    }

    let outside = state.floating_ips_outside_group();
    if !outside.is_empty() {
        let names: Vec<_> = outside
            .iter()
            .map(|flip| format!("`{}`", flip.name))
            .collect();
        let _ = writeln!(
            out,
            "Floating IPs targeted outside this group (left alone): {}",
            names.join(", ")
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan;
    use crate::resource::{HealthState, Status, WithStatus};
    use crate::test_support::{group_config, mock_floating_ip, mock_server};

    #[test]
    fn state_render_lists_servers_and_strays() {
        let mut assigned = mock_floating_ip("10", "fip-a", "nbg1", "eu-central");
        assigned.current_target = Some("1".into());
        let mut stray = mock_floating_ip("11", "fip-b", "nbg1", "eu-central");
        stray.current_target = Some("999".into());
        let unassigned = mock_floating_ip("12", "fip-c", "nbg1", "eu-central");

        let state = PlanState::new(
            vec![assigned, stray, unassigned],
            vec![WithStatus::new(
                mock_server("1", "srv-1", "nbg1", "eu-central", 1),
                HealthState {
                    status: Status::Healthy,
                    last_updated: None,
                },
            )],
        );

        let rendered = render_state(&group_config("g1"), &state);
        assert!(rendered.contains("`srv-1` (1) in `nbg1`: _healthy_ `fip-a`"));
        assert!(rendered.contains("Unassigned floating IPs: `fip-c`"));
        assert!(rendered.contains("left alone): `fip-b`"));
    }

    #[test]
    fn plan_render_marks_moving_ips() {
        let flip = mock_floating_ip("10", "fip-a", "nbg1", "eu-central");
        let state = PlanState::new(
            vec![flip],
            vec![WithStatus::new(
                mock_server("1", "srv-1", "nbg1", "eu-central", -1),
                HealthState {
                    status: Status::Healthy,
                    last_updated: None,
                },
            )],
        );

        let action_plan = plan::plan(&state);
        assert!(!action_plan.is_empty());

        let rendered = render_plan_execution(&group_config("g1"), &state, &action_plan);
        assert!(rendered.contains("Executing plan"));
        assert!(rendered.contains("`fip-a` (10) → `srv-1` (1)"));
    }
}
