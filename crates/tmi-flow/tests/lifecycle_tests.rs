//! Lifecycle tests: simulate, apply, purge and their failure paths.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Duration;

use tmi_core::codes::CodeList;
use tmi_core::FlightKey;
use tmi_flow::applier::{LiveStateApplier, ProgramWrite};
use tmi_flow::config::EngineConfig;
use tmi_flow::error::{Error, Result};
use tmi_flow::exemption::ExemptionRuleSet;
use tmi_flow::field_map::FIELD_MAP_VERSION;
use tmi_flow::lifecycle::PurgeScope;
use tmi_flow::outbox::AuditAction;
use tmi_flow::program::{ProgramFamily, ProgramStatus, RateConfig};
use tmi_flow::request::ProgramRequest;
use tmi_flow::sandbox::{SandboxKey, SandboxScope};
use tmi_flow::slot::SlotStatus;
use tmi_flow::store::{ProgramFilter, Store};
use tmi_test_utils::{assert_untagged, at, text, FlightBuilder, Scenario, TestContext};

fn key(raw: &str) -> FlightKey {
    FlightKey::new(raw).unwrap()
}

#[tokio::test]
async fn gdp_round_trip_simulate_apply_purge() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Scenario::steady_arrivals("KATL", 12));

    let simulated = ctx
        .manager
        .simulate(&Scenario::gdp_request("KATL").requested_by("ops1"))
        .await?;
    let id = simulated.program.program_id.clone();
    assert_eq!(id.as_str(), "GDP-KATL-202603141800");
    assert!(ctx.store.live_flights_for_program(&id).await?.is_empty());

    ctx.clock.advance(Duration::minutes(5));
    let applied = ctx.manager.apply(&id, Some("ops2")).await?;
    assert_eq!(applied.program.status, ProgramStatus::Active);
    assert_eq!(applied.program.activated_by.as_deref(), Some("ops2"));
    assert_eq!(applied.program.activated_at, Some(at(17, 5)));
    assert_eq!(applied.applied_count, 12);
    assert_eq!(applied.control_records_created, 12);
    assert_eq!(applied.missing_flights, 0);
    assert_eq!(applied.flights.len(), 12);
    assert_eq!(applied.metrics.summary, simulated.summary);
    assert_eq!(applied.metrics.field_map_version, FIELD_MAP_VERSION);
    assert_eq!(applied.program.metrics.as_ref(), Some(&applied.metrics));

    let staged = simulated
        .flights
        .iter()
        .find(|f| f.flight.callsign == "UAL105")
        .expect("staged");
    let live = ctx
        .store
        .get_live_flight(staged.flight_key())
        .await?
        .expect("live");
    let control = live.control.expect("control record");
    assert_eq!(control.cta, staged.control.cta);
    assert_eq!(control.ctd, staged.control.ctd);
    assert_eq!(control.slot_index, staged.control.slot_index);

    let sandbox_key = SandboxKey::Program(id.clone());
    assert!(ctx.store.get_sandbox(&sandbox_key).await?.is_none());
    let slots = ctx.store.get_slots(&id).await?;
    assert_eq!(slots.len(), 80);
    assert_eq!(
        slots.iter().filter(|s| s.status == SlotStatus::Assigned).count(),
        12
    );

    let purged = ctx
        .manager
        .purge(&PurgeScope::Program(id.clone()), Some("ops3"))
        .await?;
    assert_eq!(purged.flights_cleared, 12);
    assert_eq!(purged.slots_cancelled, 12);
    let program = &purged.programs[0];
    assert_eq!(program.status, ProgramStatus::Purged);
    assert_eq!(program.purged_by.as_deref(), Some("ops3"));
    assert!(program.metrics.is_some());

    let live = ctx.store.get_live_flight(staged.flight_key()).await?.expect("live");
    let control = live.control.expect("record kept");
    assert!(control.program_id.is_none());
    assert!(control.cta.is_none());
    assert_eq!(control.baseline.oeta, staged.control.baseline.oeta);
    let slots = ctx.store.get_slots(&id).await?;
    assert_eq!(
        slots.iter().filter(|s| s.status == SlotStatus::Cancelled).count(),
        12
    );

    assert_eq!(
        ctx.outbox.actions(),
        vec![
            AuditAction::ProgramSimulated,
            AuditAction::ProgramActivated,
            AuditAction::ProgramPurged,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn apply_without_a_plan_fails() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Vec::new());
    let missing = tmi_core::ProgramId::new("GDP-KATL-X")?;
    let err = ctx.manager.apply(&missing, None).await.unwrap_err();
    assert!(matches!(err, Error::ProgramNotFound { .. }));

    let simulated = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let id = simulated.program.program_id;
    let err = ctx.manager.apply(&id, None).await.unwrap_err();
    assert!(matches!(err, Error::NothingToApply { ref program_id } if *program_id == id));

    let program = ctx.manager.get_program(&id).await?;
    assert_eq!(program.status, ProgramStatus::Simulated);
    assert_eq!(ctx.outbox.actions(), vec![AuditAction::ProgramSimulated]);
    Ok(())
}

#[tokio::test]
async fn apply_rolls_back_at_every_step() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Scenario::steady_arrivals("KATL", 6));
    let simulated = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let id = simulated.program.program_id.clone();

    let sandbox_key = SandboxKey::Program(id.clone());
    let sandbox = ctx.store.get_sandbox(&sandbox_key).await?.expect("staged");
    let steps = LiveStateApplier::default()
        .plan_apply(&sandbox, ProgramWrite::new(simulated.program.clone(), Some(1)))
        .steps();
    assert_eq!(steps.len(), 6);

    for step in steps {
        ctx.store.fail_at(step)?;
        let err = ctx.manager.apply(&id, Some("ops1")).await.unwrap_err();
        assert!(
            matches!(err, Error::CommitFailed { step: failed, .. } if failed == step),
            "expected failure at {step}, got {err}"
        );

        assert_untagged(&ctx.store.live_flights_for_program(&id).await?, &id);
        let live = ctx
            .store
            .get_live_flight(simulated.flights[0].flight_key())
            .await?
            .expect("live");
        assert!(live.control.is_none(), "control record created at {step}");
        let program = ctx.manager.get_program(&id).await?;
        assert_eq!(program.status, ProgramStatus::Simulated);
        assert_eq!(program.version, 1);
        assert!(ctx.store.get_slots(&id).await?.is_empty());
        assert!(ctx.store.get_sandbox(&sandbox_key).await?.is_some());
    }

    let applied = ctx.manager.apply(&id, Some("ops1")).await?;
    assert_eq!(applied.applied_count, 6);
    assert_eq!(
        ctx.outbox.actions(),
        vec![AuditAction::ProgramSimulated, AuditAction::ProgramActivated]
    );
    Ok(())
}

#[tokio::test]
async fn invalid_requests_have_no_side_effects() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Scenario::steady_arrivals("KATL", 5));
    let invalid = [
        ProgramRequest::ground_delay("", &text(at(18, 0)), &text(at(20, 0))),
        ProgramRequest::ground_delay("KATL", "next tuesday", &text(at(20, 0))),
        ProgramRequest::ground_delay("KATL", &text(at(20, 0)), &text(at(18, 0))),
        Scenario::gdp_request("KATL").with_rates(0, 0),
        Scenario::gdp_request("KATL").with_rates(40, -1),
        Scenario::gdp_request("KATL").with_delay_limit(0),
        ProgramRequest::ground_stop("KJFK", ""),
    ];

    for request in &invalid {
        let err = ctx.manager.simulate(request).await.unwrap_err();
        assert!(err.is_validation(), "expected validation error, got {err}");
        let err = ctx.manager.preview(request).await.unwrap_err();
        assert!(err.is_validation(), "expected validation error, got {err}");
    }

    assert_eq!(ctx.store.program_count()?, 0);
    assert!(ctx.store.list_sandboxes().await?.is_empty());
    assert!(ctx.outbox.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn program_type_cannot_change_on_resimulate() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Vec::new());
    ctx.manager
        .simulate(&Scenario::gdp_request("KJFK").with_program_id("TMI-1"))
        .await?;
    let err = ctx
        .manager
        .simulate(&Scenario::gs_request("KJFK").with_program_id("TMI-1"))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    Ok(())
}

#[tokio::test]
async fn per_program_sandboxes_coexist() -> Result<()> {
    let mut flights = Scenario::steady_arrivals("KATL", 4);
    flights.extend(Scenario::steady_arrivals("KCLT", 3));
    let config = EngineConfig::default().with_sandbox_scope(SandboxScope::PerProgram);
    let ctx = TestContext::with_config(config, at(17, 0), flights);

    let atl = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let clt = ctx.manager.simulate(&Scenario::gdp_request("KCLT")).await?;
    assert_eq!(ctx.store.list_sandboxes().await?.len(), 2);

    let atl = ctx.manager.apply(&atl.program.program_id, None).await?;
    let clt = ctx.manager.apply(&clt.program.program_id, None).await?;
    assert_eq!(atl.applied_count, 4);
    assert_eq!(clt.applied_count, 3);
    Ok(())
}

#[tokio::test]
async fn per_type_sandbox_is_replaced_by_later_simulate() -> Result<()> {
    let mut flights = Scenario::steady_arrivals("KATL", 4);
    flights.extend(Scenario::steady_arrivals("KCLT", 3));
    let config = EngineConfig::default().with_sandbox_scope(SandboxScope::PerProgramType);
    let ctx = TestContext::with_config(config, at(17, 0), flights);

    let atl = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let clt = ctx.manager.simulate(&Scenario::gdp_request("KCLT")).await?;
    let sandboxes = ctx.store.list_sandboxes().await?;
    assert_eq!(sandboxes.len(), 1);
    assert_eq!(sandboxes[0].key, SandboxKey::Family(ProgramFamily::GroundDelay));
    assert_eq!(sandboxes[0].program_id, clt.program.program_id);

    let err = ctx
        .manager
        .apply(&atl.program.program_id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::SandboxConflict { ref owner, .. } if *owner == clt.program.program_id
    ));
    assert!(ctx
        .store
        .live_flights_for_program(&atl.program.program_id)
        .await?
        .is_empty());

    let applied = ctx.manager.apply(&clt.program.program_id, None).await?;
    assert_eq!(applied.applied_count, 3);

    // A GS stages in its own family area.
    ctx.manager.simulate(&Scenario::gs_request("KATL")).await?;
    let keys: Vec<SandboxKey> = ctx
        .store
        .list_sandboxes()
        .await?
        .into_iter()
        .map(|s| s.key)
        .collect();
    assert_eq!(keys, vec![SandboxKey::Family(ProgramFamily::GroundStop)]);
    Ok(())
}

#[tokio::test]
async fn apply_matches_by_flight_key_after_feed_resync() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Scenario::steady_arrivals("KATL", 5));
    let simulated = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let id = simulated.program.program_id;

    // The feed rebuilds every row and drops one flight.
    let dropped = key("DAL101-KDFW-KATL");
    ctx.store
        .sync_live_flights(Scenario::steady_arrivals("KATL", 5), at(17, 2))
        .await?;
    assert_eq!(ctx.store.remove_live_flights(&[dropped.clone()]).await?, 1);

    let applied = ctx.manager.apply(&id, None).await?;
    assert_eq!(applied.applied_count, 4);
    assert_eq!(applied.missing_flights, 1);
    assert!(applied.flights.iter().all(|f| f.flight.flight_key != dropped));
    Ok(())
}

#[tokio::test]
async fn reapply_releases_flights_dropped_from_the_plan() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Scenario::steady_arrivals("KATL", 6));
    let first = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let id = first.program.program_id;
    ctx.manager.apply(&id, None).await?;

    let revised = Scenario::gdp_request("KATL").with_exemptions(ExemptionRuleSet {
        carriers: CodeList::parse("UAL"),
        ..ExemptionRuleSet::default()
    });
    let second = ctx.manager.simulate(&revised).await?;
    assert_eq!(second.program.status, ProgramStatus::Active);
    assert_eq!(second.summary.exempt_flights, 2);

    let applied = ctx.manager.apply(&id, None).await?;
    assert_eq!(applied.applied_count, 4);
    assert_eq!(applied.flights.len(), 4);
    let released = ctx
        .store
        .get_live_flight(&key("UAL102-KBOS-KATL"))
        .await?
        .expect("live");
    assert!(released.program_id().is_none());
    Ok(())
}

#[tokio::test]
async fn revision_config_reaches_program_only_on_apply() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Scenario::steady_arrivals("KATL", 12));
    let first = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let id = first.program.program_id;
    ctx.manager.apply(&id, Some("ops1")).await?;
    let applied = ctx.manager.get_program(&id).await?.config();
    assert_eq!(applied.window.end, at(20, 0));
    assert_eq!(applied.rates, Some(RateConfig::flat(40, 0)));
    assert_eq!(applied.delay_limit_min, Some(180));

    let revision = ProgramRequest::ground_delay("KATL", &text(at(18, 0)), &text(at(22, 0)))
        .with_rates(12, 0)
        .with_delay_limit(30);
    let staged = ctx.manager.simulate(&revision).await?;
    assert_eq!(staged.program.program_id, id);
    assert_eq!(staged.program.status, ProgramStatus::Active);
    assert_eq!(staged.program.config(), applied);

    // Discarding the revision leaves the applied configuration in force.
    let discarded = ctx.manager.purge_local(Some(&id), None).await?;
    assert_eq!(discarded.programs, vec![id.clone()]);
    let program = ctx.manager.get_program(&id).await?;
    assert_eq!(program.status, ProgramStatus::Active);
    assert_eq!(program.config(), applied);
    assert_eq!(program.window.end, at(20, 0));

    // Applying the revision is what makes it current.
    ctx.manager.simulate(&revision).await?;
    ctx.manager.apply(&id, None).await?;
    let revised = ctx.manager.get_program(&id).await?;
    assert_eq!(revised.window.end, at(22, 0));
    assert_eq!(revised.rates, Some(RateConfig::flat(12, 0)));
    assert_eq!(revised.delay_limit_min, Some(30));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_apply_commits_once() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Scenario::steady_arrivals("KATL", 10));
    let simulated = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let id = simulated.program.program_id;

    let manager = Arc::new(ctx.manager);
    let first = {
        let (manager, id) = (Arc::clone(&manager), id.clone());
        tokio::spawn(async move { manager.apply(&id, Some("ops1")).await })
    };
    let second = {
        let (manager, id) = (Arc::clone(&manager), id.clone());
        tokio::spawn(async move { manager.apply(&id, Some("ops2")).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                err,
                Error::NothingToApply { .. } | Error::VersionConflict { .. }
            ),
            "unexpected error {err}"
        );
    }

    assert_eq!(ctx.store.program_count()?, 1);
    let program = manager.get_program(&id).await?;
    assert_eq!(program.status, ProgramStatus::Active);
    assert_eq!(program.version, 2);
    assert_eq!(ctx.store.live_flights_for_program(&id).await?.len(), 10);
    assert_eq!(
        ctx.outbox
            .actions()
            .iter()
            .filter(|a| **a == AuditAction::ProgramActivated)
            .count(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn repeated_apply_replaces_metrics_but_rewrites_live_flights() -> Result<()> {
    let ctx = TestContext::new(at(17, 0), Scenario::steady_arrivals("KATL", 10));
    let id = ctx
        .manager
        .simulate(&Scenario::gdp_request("KATL"))
        .await?
        .program
        .program_id;
    let first = ctx.manager.apply(&id, None).await?;
    let moved = key("AAL100-KORD-KATL");
    let first_cta = ctx
        .store
        .get_live_flight(&moved)
        .await?
        .and_then(|f| f.control)
        .and_then(|c| c.cta);
    assert_eq!(first_cta, Some(at(18, 0)));

    // The feed moves one arrival 40 minutes later.
    ctx.clock.advance(Duration::minutes(10));
    let late = FlightBuilder::new("AAL100", "KORD", "KATL")
        .arrives(at(18, 40), 120)
        .centers("ZAU", "ZTL")
        .build();
    ctx.store.sync_live_flights(vec![late], at(17, 10)).await?;
    ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let second = ctx.manager.apply(&id, None).await?;

    // Metrics: still one program row holding one snapshot, replaced in place.
    assert_eq!(ctx.store.program_count()?, 1);
    let program = ctx.manager.get_program(&id).await?;
    assert_eq!(program.version, first.program.version + 2);
    assert_eq!(program.metrics.as_ref(), Some(&second.metrics));
    assert_eq!(second.metrics.captured_at, at(17, 10));
    assert_eq!(second.metrics.summary.controlled_flights, 10);
    assert_eq!(
        first.metrics.summary.controlled_flights,
        second.metrics.summary.controlled_flights
    );

    // Live: the flight's control times were rewritten.
    let second_cta = ctx
        .store
        .get_live_flight(&moved)
        .await?
        .and_then(|f| f.control)
        .and_then(|c| c.cta);
    assert_ne!(second_cta, first_cta);
    assert!(second_cta.is_some_and(|cta| cta >= at(18, 40)));
    Ok(())
}

#[tokio::test]
async fn purge_local_discards_staging_only() -> Result<()> {
    let mut flights = Scenario::steady_arrivals("KATL", 3);
    flights.push(
        FlightBuilder::new("JBU5", "KBOS", "KJFK")
            .departs(at(18, 0), 75)
            .build(),
    );
    let ctx = TestContext::new(at(17, 0), flights);

    let gdp = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await?;
    let gs = ctx.manager.simulate(&Scenario::gs_request("KJFK")).await?;
    ctx.manager.apply(&gs.program.program_id, None).await?;
    ctx.manager.simulate(&Scenario::gs_request("KJFK")).await?;

    let one = ctx
        .manager
        .purge_local(Some(&gdp.program.program_id), Some("ops1"))
        .await?;
    assert_eq!(one.flights_cleared, 3);
    assert_eq!(one.slots_cleared, 80);
    let program = ctx.manager.get_program(&gdp.program.program_id).await?;
    assert_eq!(program.status, ProgramStatus::Draft);

    let all = ctx.manager.purge_local(None, None).await?;
    assert_eq!(all.programs, vec![gs.program.program_id.clone()]);
    assert_eq!(all.flights_cleared, 1);
    assert!(ctx.store.list_sandboxes().await?.is_empty());

    // The applied GS is untouched.
    let program = ctx.manager.get_program(&gs.program.program_id).await?;
    assert_eq!(program.status, ProgramStatus::Active);
    assert_eq!(
        ctx.store
            .live_flights_for_program(&gs.program.program_id)
            .await?
            .len(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn purge_by_control_element() -> Result<()> {
    let flights = vec![
        FlightBuilder::new("JBU5", "KBOS", "KJFK")
            .departs(at(18, 0), 75)
            .build(),
        FlightBuilder::new("JBU6", "KBOS", "KJFK")
            .departs(at(18, 30), 75)
            .build(),
    ];
    let ctx = TestContext::new(at(17, 0), flights);

    let nothing = ctx
        .manager
        .purge(&PurgeScope::ControlElement("KJFK".into()), None)
        .await?;
    assert!(nothing.programs.is_empty());

    let gs = ctx.manager.simulate(&Scenario::gs_request("KJFK")).await?;
    let id = gs.program.program_id;
    ctx.manager.apply(&id, None).await?;

    let purged = ctx
        .manager
        .purge(&PurgeScope::ControlElement("kjfk".into()), Some("ops1"))
        .await?;
    assert_eq!(purged.programs.len(), 1);
    assert_eq!(purged.flights_cleared, 2);
    assert_eq!(purged.slots_cancelled, 0);
    assert_untagged(&ctx.store.live_flights_for_program(&id).await?, &id);

    let err = ctx
        .manager
        .purge(&PurgeScope::Program(id.clone()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }));
    let err = ctx.manager.simulate(&Scenario::gs_request("KJFK")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }));
    Ok(())
}

#[tokio::test]
async fn complete_closes_an_active_program() -> Result<()> {
    let flights = vec![FlightBuilder::new("JBU5", "KBOS", "KJFK")
        .departs(at(18, 0), 75)
        .build()];
    let ctx = TestContext::new(at(17, 0), flights);
    let id = ctx
        .manager
        .simulate(&Scenario::gs_request("KJFK"))
        .await?
        .program
        .program_id;

    let err = ctx.manager.complete(&id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }));

    ctx.manager.apply(&id, None).await?;
    ctx.clock.set(at(20, 1));
    let program = ctx.manager.complete(&id).await?;
    assert_eq!(program.status, ProgramStatus::Completed);
    assert_eq!(program.completed_at, Some(at(20, 1)));

    let listed = ctx
        .manager
        .list_programs(&ProgramFilter::all().with_status(ProgramStatus::Completed))
        .await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(
        ctx.outbox.actions().last(),
        Some(&AuditAction::ProgramCompleted)
    );
    Ok(())
}
