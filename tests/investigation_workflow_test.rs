mod common;

use assert_matches::assert_matches;
use backoffice_variance::{
    entities::{
        inventory_period::Model as PeriodModel,
        period_inventory_snapshot::SnapshotType,
        theoretical_usage_analysis::{InvestigationStatus, Model as AnalysisModel, VariancePriority},
    },
    errors::ServiceError,
    events::Event,
    services::variance::{
        CalculationRequest, InvestigateRequest, Resolution, ResolveRequest, TrendQuery,
        VarianceFilter,
    },
};
use common::{date, ItemSeed, TestContext};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Counts each (item, beginning, ending) and calculates the period.
async fn calculated_period(
    ctx: &TestContext,
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
    counts: &[(Uuid, Decimal, Decimal)],
) -> (PeriodModel, Vec<AnalysisModel>) {
    let period = ctx.active_period(start, end).await;
    for (item_id, beginning, ending) in counts {
        ctx.count(period.id, *item_id, SnapshotType::Beginning, *beginning).await;
        ctx.count(period.id, *item_id, SnapshotType::Ending, *ending).await;
    }
    let outcome = ctx
        .services
        .usage
        .calculate_usage_for_period(
            period.id,
            CalculationRequest {
                method: "recipe_based".into(),
                item_ids: None,
                recalculate: false,
            },
        )
        .await
        .expect("calculation");
    (period, outcome.analyses)
}

async fn close(ctx: &TestContext, period_id: Uuid) {
    let periods = &ctx.services.periods;
    for kind in [SnapshotType::Beginning, SnapshotType::Ending] {
        periods
            .complete_snapshots(period_id, kind)
            .await
            .expect("snapshots complete");
    }
    periods.close_period(period_id).await.expect("close");
}

#[tokio::test]
async fn variance_is_investigated_then_resolved() {
    let mut ctx = TestContext::new().await;
    let item = ctx.create_item("Salmon", dec!(12)).await;
    let (_, analyses) = calculated_period(
        &ctx,
        date(2024, 3, 4),
        date(2024, 3, 11),
        &[(item.id, dec!(20), dec!(8))],
    )
    .await;
    let analysis = &analyses[0];
    let manager = Uuid::new_v4();

    let investigating = ctx
        .services
        .investigations
        .investigate_variance(
            analysis.id,
            InvestigateRequest {
                assigned_to: manager,
                notes: Some("Check the walk-in log".into()),
            },
        )
        .await
        .expect("investigate");
    assert_eq!(investigating.investigation_status, InvestigationStatus::Investigating);
    assert_eq!(investigating.assigned_to, Some(manager));
    assert!(investigating.assigned_at.is_some());
    assert_eq!(
        investigating.investigation_notes.as_deref(),
        Some("Check the walk-in log")
    );

    let accepted = ctx
        .services
        .investigations
        .resolve_variance_investigation(
            analysis.id,
            ResolveRequest {
                resolved_by: manager,
                explanation: "Spoiled delivery, credited by supplier".into(),
                resolution: Resolution::Accepted,
            },
        )
        .await
        .expect("resolve");
    assert_eq!(accepted.investigation_status, InvestigationStatus::Accepted);
    assert_eq!(accepted.investigated_by, Some(manager));
    assert!(accepted.resolved_at.is_some());
    assert!(accepted.explanation.is_some());

    let again = ctx
        .services
        .investigations
        .resolve_variance_investigation(
            analysis.id,
            ResolveRequest {
                resolved_by: manager,
                explanation: "second try".into(),
                resolution: Resolution::Resolved,
            },
        )
        .await;
    assert_matches!(again, Err(ServiceError::InvalidTransition { .. }));

    let reopen = ctx
        .services
        .investigations
        .investigate_variance(
            analysis.id,
            InvestigateRequest {
                assigned_to: manager,
                notes: None,
            },
        )
        .await;
    assert_matches!(reopen, Err(ServiceError::InvalidTransition { from, to }) if from == "accepted" && to == "investigating");

    let published = ctx.drain_events();
    assert!(published
        .iter()
        .any(|e| matches!(e, Event::InvestigationStarted { assigned_to, .. } if *assigned_to == manager)));
    assert!(published.iter().any(|e| matches!(
        e,
        Event::InvestigationResolved { resolution, .. } if resolution == "accepted"
    )));
}

#[tokio::test]
async fn pending_variance_can_be_resolved_directly() {
    let ctx = TestContext::new().await;
    let item = ctx.create_item("Limes", dec!(0.3)).await;
    let (_, analyses) = calculated_period(
        &ctx,
        date(2024, 3, 4),
        date(2024, 3, 11),
        &[(item.id, dec!(40), dec!(31))],
    )
    .await;

    let escalated = ctx
        .services
        .investigations
        .resolve_variance_investigation(
            analyses[0].id,
            ResolveRequest {
                resolved_by: Uuid::new_v4(),
                explanation: "Needs regional review".into(),
                resolution: Resolution::Escalated,
            },
        )
        .await
        .expect("escalate");
    assert_eq!(escalated.investigation_status, InvestigationStatus::Escalated);
}

#[tokio::test]
async fn resolution_requires_an_explanation() {
    let ctx = TestContext::new().await;
    let item = ctx.create_item("Limes", dec!(0.3)).await;
    let (_, analyses) = calculated_period(
        &ctx,
        date(2024, 3, 4),
        date(2024, 3, 11),
        &[(item.id, dec!(40), dec!(31))],
    )
    .await;

    let result = ctx
        .services
        .investigations
        .resolve_variance_investigation(
            analyses[0].id,
            ResolveRequest {
                resolved_by: Uuid::new_v4(),
                explanation: String::new(),
                resolution: Resolution::Resolved,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let missing = ctx
        .services
        .investigations
        .investigate_variance(
            Uuid::new_v4(),
            InvestigateRequest {
                assigned_to: Uuid::new_v4(),
                notes: None,
            },
        )
        .await;
    assert_matches!(missing, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn report_filters_and_orders_by_dollar_impact() {
    let ctx = TestContext::new().await;
    let cheap = ctx.create_item("Napkins", dec!(0.05)).await;
    let pricey = ctx
        .create_item_with(ItemSeed {
            name: "Wagyu".into(),
            unit_cost: dec!(30),
            threshold_quantity: dec!(2),
            threshold_dollar: dec!(40),
            high_value: true,
            ..ItemSeed::default()
        })
        .await;
    let (period, _) = calculated_period(
        &ctx,
        date(2024, 3, 4),
        date(2024, 3, 11),
        &[
            (cheap.id, dec!(500), dec!(450)),
            (pricey.id, dec!(10), dec!(4)),
        ],
    )
    .await;

    let report = ctx
        .services
        .reporting
        .analyze_period_variance(period.id, VarianceFilter::default())
        .await
        .expect("report");
    assert_eq!(report.totals.count, 2);
    assert_eq!(report.analyses[0].inventory_item_id, pricey.id);
    assert_eq!(report.analyses[0].priority, VariancePriority::Critical);
    assert_eq!(report.totals.total_absolute_dollar.round_dp(2), dec!(182.50));

    let critical_only = ctx
        .services
        .reporting
        .analyze_period_variance(
            period.id,
            VarianceFilter {
                priority: Some(VariancePriority::Critical),
                ..VarianceFilter::default()
            },
        )
        .await
        .expect("filtered report");
    assert_eq!(critical_only.analyses.len(), 1);

    let large = ctx
        .services
        .reporting
        .analyze_period_variance(
            period.id,
            VarianceFilter {
                min_dollar_impact: Some(dec!(100)),
                ..VarianceFilter::default()
            },
        )
        .await
        .expect("impact report");
    assert_eq!(large.analyses.len(), 1);
    assert_eq!(large.analyses[0].inventory_item_id, pricey.id);

    let summary = ctx
        .services
        .reporting
        .priority_variance_summary(period.id)
        .await
        .expect("summary");
    assert_eq!(summary.buckets.len(), 4);
    assert_eq!(summary.buckets[0].priority, VariancePriority::Critical);
    assert_eq!(summary.buckets[0].count, 1);
    assert_eq!(summary.buckets[0].unresolved, 1);
    assert!(!summary.recommendations.is_empty());
    assert!(summary.recommendations[0].analysis_ids.contains(&report.analyses[0].id));

    let unknown = ctx
        .services
        .reporting
        .priority_variance_summary(Uuid::new_v4())
        .await;
    assert_matches!(unknown, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn trends_span_closed_periods_oldest_first() {
    let ctx = TestContext::new().await;
    let item = ctx.create_item("Avocado", dec!(2)).await;

    let weeks = [
        (date(2024, 2, 19), date(2024, 2, 26), dec!(2)),
        (date(2024, 2, 26), date(2024, 3, 4), dec!(4)),
        (date(2024, 3, 4), date(2024, 3, 11), dec!(10)),
    ];
    for (start, end, used) in weeks {
        let (period, _) =
            calculated_period(&ctx, start, end, &[(item.id, dec!(20), dec!(20) - used)]).await;
        close(&ctx, period.id).await;
    }
    // Still active; never part of a trend.
    calculated_period(
        &ctx,
        date(2024, 3, 11),
        date(2024, 3, 18),
        &[(item.id, dec!(20), dec!(0))],
    )
    .await;

    let trends = ctx
        .services
        .reporting
        .historical_variance_trends(ctx.restaurant_id, TrendQuery::default())
        .await
        .expect("trends");
    assert_eq!(trends.len(), 1);
    let trend = &trends[0];
    assert_eq!(trend.item_id, item.id);
    assert_eq!(trend.points.len(), 3);
    assert_eq!(trend.points[0].period_start, date(2024, 2, 19));
    assert_eq!(trend.average_variance_quantity.round_dp(4), dec!(5.3333));
    assert_eq!(trend.direction.to_string(), "increasing");

    let recent = ctx
        .services
        .reporting
        .historical_variance_trends(
            ctx.restaurant_id,
            TrendQuery {
                item_ids: None,
                periods: Some(2),
            },
        )
        .await
        .expect("recent trends");
    assert_eq!(recent[0].points.len(), 2);
    assert_eq!(recent[0].points[0].period_start, date(2024, 2, 26));

    let other_item = ctx
        .services
        .reporting
        .historical_variance_trends(
            ctx.restaurant_id,
            TrendQuery {
                item_ids: Some(vec![Uuid::new_v4()]),
                periods: None,
            },
        )
        .await
        .expect("empty trends");
    assert!(other_item.is_empty());
}
