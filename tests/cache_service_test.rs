mod helpers;

use std::time::Duration;

use dynacache::domain::errors::CacheError;
use dynacache::domain::models::{CacheConfig, CallContext, ChangeEvent, ChangeOperation, EntityKind};
use dynacache::services::{ChangeHandler, InvalidateRequest};

use helpers::{agent, Harness, BROKEN};

#[tokio::test]
async fn test_get_agent_hits_until_configuration_changes() {
    let h = Harness::new();
    h.add_agent("web_agent").await;
    let ctx = CallContext::new();

    let first = h.service.get_agent("web_agent", &ctx).await.unwrap();
    let second = h.service.get_agent("web_agent", &ctx).await.unwrap();
    assert_eq!(first, "web_agent@default/global");
    assert_eq!(first, second);
    assert_eq!(h.agent_builder.calls(), 1);

    // A new updated_at changes the fingerprint, so the next lookup rebuilds.
    h.add_agent("web_agent").await;
    h.service.get_agent("web_agent", &ctx).await.unwrap();
    assert_eq!(h.agent_builder.calls(), 2);

    h.service.get_agent("web_agent", &ctx).await.unwrap();
    assert_eq!(h.agent_builder.calls(), 2);
}

#[tokio::test]
async fn test_contexts_are_cached_separately_and_invalidated_together() {
    let h = Harness::new();
    h.add_agent("finance_agent").await;

    let plain = CallContext::new();
    let tuned = CallContext::new().with_model("o3").with_actor("u-1");

    assert_eq!(
        h.service.get_agent("finance_agent", &tuned).await.unwrap(),
        "finance_agent@o3/u-1"
    );
    h.service.get_agent("finance_agent", &plain).await.unwrap();
    assert_eq!(h.agent_builder.calls(), 2);
    assert_eq!(h.service.stats().await.agents.total, 2);

    let report = h
        .service
        .invalidate(&InvalidateRequest::entity("finance_agent"))
        .await
        .unwrap();
    assert_eq!(report.agents_removed, 2);

    let again = h
        .service
        .invalidate(&InvalidateRequest::entity("finance_agent"))
        .await
        .unwrap();
    assert_eq!(again.total(), 0);
}

#[tokio::test]
async fn test_empty_invalidate_request_is_rejected() {
    let h = Harness::new();
    let err = h.service.invalidate(&InvalidateRequest::default()).await.unwrap_err();
    assert!(matches!(err, CacheError::Validation(_)));
}

#[tokio::test]
async fn test_unknown_and_inactive_agents_are_not_found() {
    let h = Harness::new();
    h.add_agent("retired").await;
    h.agents.set_active("retired", false).await;

    for id in ["missing", "retired"] {
        let err = h.service.get_agent(id, &CallContext::new()).await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound { kind: EntityKind::Agent, .. }));
    }

    assert_eq!(h.agent_builder.calls(), 0);
    assert_eq!(h.service.stats().await.agents.total, 0);
}

#[tokio::test]
async fn test_build_failures_are_not_cached() {
    let h = Harness::new();
    let mut definition = agent("flaky");
    definition.name = format!("{BROKEN}-flaky");
    h.agents.upsert("flaky", definition).await;

    for expected_calls in 1..=2 {
        let err = h.service.get_agent("flaky", &CallContext::new()).await.unwrap_err();
        assert!(matches!(err, CacheError::BuildFailure { ref id, .. } if id == "flaky"));
        assert_eq!(h.agent_builder.calls(), expected_calls);
    }
    assert_eq!(h.service.stats().await.agents.total, 0);
}

#[tokio::test]
async fn test_store_outage_propagates_without_caching() {
    let h = Harness::new();
    h.add_agent("web_agent").await;
    h.agents.set_unavailable(true);

    let err = h.service.get_agent("web_agent", &CallContext::new()).await.unwrap_err();
    assert!(matches!(err, CacheError::Database(_)));

    h.agents.set_unavailable(false);
    assert!(h.service.get_agent("web_agent", &CallContext::new()).await.is_ok());
}

#[tokio::test]
async fn test_get_tools_isolates_failures() {
    let h = Harness::new();
    let search = h.add_tool("search").await;
    let calc = h.add_tool("calculator").await;
    let broken = h.add_tool(&format!("{BROKEN}-tool")).await;
    let unknown = uuid::Uuid::new_v4().to_string();

    let ids = vec![search.clone(), broken.clone(), unknown.clone(), calc.clone()];
    let outcome = h.service.get_tools(&ids).await.unwrap();

    let resolved: Vec<&str> = outcome.resolved.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(resolved, vec![search.as_str(), calc.as_str()]);
    assert_eq!(outcome.built, 2);
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome
        .failures
        .iter()
        .any(|f| f.entity_id == unknown && matches!(f.error, CacheError::NotFound { .. })));
    assert!(outcome
        .failures
        .iter()
        .any(|f| f.entity_id == broken && matches!(f.error, CacheError::BuildFailure { .. })));

    let cached = h.service.get_tools(&ids).await.unwrap();
    assert_eq!(cached.hits, 2);
    assert_eq!(cached.built, 0);
    assert_eq!(
        cached.into_instances(),
        vec!["tool:search".to_string(), "tool:calculator".to_string()]
    );
}

#[tokio::test]
async fn test_team_invalidated_by_member_delete() {
    let h = Harness::new();
    for id in ["a", "b", "c", "d"] {
        h.add_agent(id).await;
    }
    let ctx = CallContext::new();
    let ab = vec!["a".to_string(), "b".to_string()];
    let cd = vec!["c".to_string(), "d".to_string()];

    assert_eq!(h.service.get_team(&ab, &ctx).await.unwrap().len(), 2);
    assert_eq!(h.service.get_team(&cd, &ctx).await.unwrap().len(), 2);
    assert_eq!(h.service.stats().await.teams.cached_composites, 2);

    let applied = h
        .service
        .handle_change(&ChangeEvent::new(ChangeOperation::Delete, "agents", "a"))
        .await;
    assert!(applied);

    let stats = h.service.stats().await;
    assert_eq!(stats.teams.cached_composites, 1);
    assert_eq!(stats.agents.total, 3);

    // {C,D} is still served from the composite cache.
    let calls = h.agent_builder.calls();
    h.service.get_team(&cd, &ctx).await.unwrap();
    assert_eq!(h.agent_builder.calls(), calls);
}

#[tokio::test]
async fn test_team_skips_failing_members() {
    let h = Harness::new();
    h.add_agent("lead").await;

    let members = vec!["lead".to_string(), "ghost".to_string()];
    let team = h.service.get_team(&members, &CallContext::new()).await.unwrap();
    assert_eq!(team, vec!["lead@default/global".to_string()]);
}

#[tokio::test]
async fn test_team_rebuilds_after_member_update() {
    let h = Harness::new();
    h.add_agent("a").await;
    h.add_agent("b").await;
    let ctx = CallContext::new();
    let team = vec!["a".to_string(), "b".to_string()];

    h.service.get_team(&team, &ctx).await.unwrap();
    h.service.get_team(&team, &ctx).await.unwrap();
    assert_eq!(h.agent_builder.calls(), 2);

    // A new updated_at on one member invalidates the assembled team.
    h.add_agent("a").await;
    let rebuilt = h.service.get_team(&team, &ctx).await.unwrap();
    assert_eq!(rebuilt, vec!["a@default/global".to_string(), "b@default/global".to_string()]);
    assert_eq!(h.agent_builder.calls(), 3);
    assert_eq!(h.service.stats().await.teams.cached_composites, 1);
}

#[tokio::test]
async fn test_team_follows_requested_order() {
    let h = Harness::new();
    h.add_agent("a").await;
    h.add_agent("b").await;
    let ctx = CallContext::new();

    h.service.get_team(&["b".to_string(), "a".to_string()], &ctx).await.unwrap();
    let team = h.service.get_team(&["a".to_string(), "b".to_string()], &ctx).await.unwrap();
    assert_eq!(team, vec!["a@default/global".to_string(), "b@default/global".to_string()]);
    assert_eq!(h.agent_builder.calls(), 2);
}

#[tokio::test]
async fn test_team_store_failure_is_returned() {
    let h = Harness::new();
    h.add_agent("a").await;
    h.agents.set_unavailable(true);

    let err = h
        .service
        .get_team(&["a".to_string()], &CallContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Database(_)));
}

#[tokio::test]
async fn test_insert_event_refreshes_agent_list() {
    let h = Harness::new();
    h.add_agent("alpha").await;
    assert_eq!(h.service.list_agents().await.unwrap(), vec!["alpha"]);

    h.add_agent("beta").await;
    assert_eq!(h.service.list_agents().await.unwrap(), vec!["alpha"]);

    h.service
        .handle_change(&ChangeEvent::new(ChangeOperation::Insert, "agents", "beta"))
        .await;
    assert_eq!(h.service.list_agents().await.unwrap(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_delete_event_drops_every_variant() {
    let h = Harness::new();
    h.add_agent("x").await;
    h.add_agent("y").await;

    for ctx in [CallContext::new(), CallContext::new().with_debug(true), CallContext::new().with_model("o3")] {
        h.service.get_agent("x", &ctx).await.unwrap();
    }
    h.service.get_agent("y", &CallContext::new()).await.unwrap();
    assert_eq!(h.service.stats().await.agents.total, 4);

    h.service
        .handle_change(&ChangeEvent::new(ChangeOperation::Delete, "agents", "x"))
        .await;
    assert_eq!(h.service.stats().await.agents.total, 1);
}

#[tokio::test]
async fn test_tool_delete_and_untracked_tables() {
    let h = Harness::new();
    let search = h.add_tool("search").await;
    h.service.get_tool(&search).await.unwrap();
    assert_eq!(h.service.stats().await.tools.total, 1);

    assert!(
        h.service
            .handle_change(&ChangeEvent::new(ChangeOperation::Delete, "tools", &search))
            .await
    );
    assert_eq!(h.service.stats().await.tools.total, 0);

    assert!(
        !h.service
            .handle_change(&ChangeEvent::new(ChangeOperation::Delete, "sessions", "s-1"))
            .await
    );
}

#[tokio::test]
async fn test_invalidate_owner_covers_owned_and_acting() {
    let h = Harness::new();
    h.agents.upsert_owned("personal", agent("personal"), "u-1").await;
    h.add_agent("shared").await;

    h.service.get_agent("personal", &CallContext::new()).await.unwrap();
    h.service
        .get_agent("shared", &CallContext::new().with_actor("u-1"))
        .await
        .unwrap();
    h.service.get_agent("shared", &CallContext::new()).await.unwrap();

    let report = h.service.invalidate(&InvalidateRequest::owner("u-1")).await.unwrap();
    assert_eq!(report.agents_removed, 2);
    assert_eq!(h.service.stats().await.agents.total, 1);
}

#[tokio::test]
async fn test_invalidate_owner_drops_teams_of_owned_agents() {
    let h = Harness::new();
    h.agents.upsert_owned("a", agent("a"), "u1").await;
    h.add_agent("b").await;
    let ctx = CallContext::new();
    h.service.get_team(&["a".to_string(), "b".to_string()], &ctx).await.unwrap();

    let report = h.service.invalidate(&InvalidateRequest::owner("u1")).await.unwrap();
    assert_eq!(report.agents_removed, 1);
    assert_eq!(report.composites_removed, 1);
    assert_eq!(h.service.stats().await.teams.cached_composites, 0);
}

#[tokio::test]
async fn test_invalidate_entity_refreshes_agent_list() {
    let h = Harness::new();
    h.add_agent("a").await;
    assert_eq!(h.service.list_agents().await.unwrap(), vec!["a"]);

    h.add_agent("z").await;
    h.service.invalidate(&InvalidateRequest::entity("z")).await.unwrap();
    assert_eq!(h.service.list_agents().await.unwrap(), vec!["a", "z"]);

    h.add_agent("m").await;
    h.service.invalidate_entity(EntityKind::Agent, "m").await;
    assert_eq!(h.service.list_agents().await.unwrap(), vec!["a", "m", "z"]);
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_ttl() {
    let config = CacheConfig {
        entity_ttl_seconds: 2,
        list_ttl_seconds: 1,
        ..CacheConfig::default()
    };
    let h = Harness::with_config(&config);
    h.add_agent("web_agent").await;
    let ctx = CallContext::new();

    h.service.get_agent("web_agent", &ctx).await.unwrap();
    tokio::time::advance(Duration::from_secs(1)).await;
    h.service.get_agent("web_agent", &ctx).await.unwrap();
    assert_eq!(h.agent_builder.calls(), 1);

    tokio::time::advance(Duration::from_millis(1500)).await;
    let stats = h.service.stats().await;
    assert_eq!(stats.agents.expired, 1);

    let report = h.service.cleanup_expired().await;
    assert_eq!(report.agents, 1);

    h.service.get_agent("web_agent", &ctx).await.unwrap();
    assert_eq!(h.agent_builder.calls(), 2);
}

#[tokio::test]
async fn test_preload_reports_failures() {
    let h = Harness::new();
    h.add_agent("alpha").await;
    h.add_agent("beta").await;
    let mut broken = agent("gamma");
    broken.name = BROKEN.to_string();
    h.agents.upsert("gamma", broken).await;

    let report = h.service.preload(None).await.unwrap();
    assert_eq!(report.requested, 3);
    assert_eq!(report.built, 2);
    assert_eq!(report.failed, vec!["gamma".to_string()]);

    let only = vec!["alpha".to_string()];
    let report = h.service.preload(Some(&only)).await.unwrap();
    assert_eq!(report.built, 1);
    assert_eq!(h.agent_builder.calls(), 3);
}

#[tokio::test]
async fn test_refresh_all_and_refresh_agent() {
    let h = Harness::new();
    h.add_agent("alpha").await;
    h.add_agent("beta").await;
    h.add_tool("search").await;

    h.service.get_agent("alpha", &CallContext::new()).await.unwrap();
    h.service.get_agent("beta", &CallContext::new()).await.unwrap();

    let report = h.service.refresh_all().await.unwrap();
    assert_eq!(report.cleared.agents_removed, 2);
    assert_eq!(report.active_agents, 2);
    assert_eq!(report.active_tools, 1);
    assert_eq!(h.service.stats().await.agents.total, 0);

    h.service.get_agent("alpha", &CallContext::new()).await.unwrap();
    h.service.refresh_agent("alpha", &CallContext::new()).await.unwrap();
    assert_eq!(h.agent_builder.calls(), 4);
    assert_eq!(h.service.stats().await.agents.total, 1);
}

#[tokio::test]
async fn test_stats_report_serializes() {
    let h = Harness::new();
    h.add_agent("alpha").await;
    h.service.get_agent("alpha", &CallContext::new()).await.unwrap();
    h.service.list_agents().await.unwrap();

    let json = serde_json::to_value(h.service.stats().await).unwrap();
    assert_eq!(json["agents"]["kind"], "agent");
    assert_eq!(json["agents"]["active"], 1);
    assert_eq!(json["agent_list"]["status"], "active");
    assert!(json["listener"].is_null());
}
