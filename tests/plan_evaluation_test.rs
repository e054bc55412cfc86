use chrono::{TimeZone, Utc};
use chrono_tz::America::Los_Angeles;
use openei_rates::rates::RatePlan;
use openei_rates::rates::cache::{CachedPlan, PlanCache};
use serde_json::json;

fn openei_document() -> serde_json::Value {
    let mut weekday_row = vec![0; 24];
    for slot in weekday_row.iter_mut().take(21).skip(16) {
        *slot = 1;
    }
    json!({
        "label": "5e1676e95457a3f87673e3b0",
        "name": "E-TOU-C Residential",
        "utility": "Fake Utility Co",
        "approved": true,
        "dgrules": "Net Metering",
        "energyratestructure": [
            [
                {"max": 300, "rate": 0.24477, "adj": 0.007, "unit": "kWh"},
                {"rate": 0.31, "adj": 0.007, "unit": "kWh"}
            ],
            [
                {"rate": 0.41, "unit": "kWh", "sell": 0.03}
            ]
        ],
        "energyweekdayschedule": vec![weekday_row; 12],
        "energyweekendschedule": vec![vec![0; 24]; 12],
        "fixedchargefirstmeter": 12.38,
        "fixedchargeunits": "$/month",
        "mincharge": 10,
        "minchargeunits": "$/month",
        "sector": "Residential",
        "startdate": 1577836800
    })
}

#[test]
fn peak_hour_in_local_time() {
    let plan: RatePlan = serde_json::from_value(openei_document()).unwrap();
    // Wednesday 16:30 PDT
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap();
    let snap = plan.evaluate(at, Los_Angeles, None).unwrap();

    assert_eq!(snap.current_rate, Some(0.41));
    assert_eq!(snap.current_sell_rate, Some(0.03));
    assert_eq!(snap.current_energy_rate_structure, Some(1));
    assert_eq!(snap.next_energy_rate_structure, Some(0));
    // Peak ends at 21:00 PDT
    assert_eq!(
        snap.next_energy_rate_structure_time,
        Some(Utc.with_ymd_and_hms(2024, 5, 2, 4, 0, 0).unwrap())
    );
    assert_eq!(snap.all_rates, vec![0.24477, 0.31, 0.41]);
    assert_eq!(snap.mincharge.as_ref().map(|m| m.value), Some(10.0));
    assert!(snap.approval);
}

#[test]
fn meter_reading_selects_usage_tier() {
    let plan: RatePlan = serde_json::from_value(openei_document()).unwrap();
    // Saturday 12:00 PDT, off-peak all weekend
    let at = Utc.with_ymd_and_hms(2024, 5, 4, 19, 0, 0).unwrap();

    let low = plan.evaluate(at, Los_Angeles, Some(120.0)).unwrap();
    assert_eq!(low.current_rate, Some(0.24477));
    assert_eq!(low.monthly_tier_rate, Some(0.24477 + 0.007));

    let high = plan.evaluate(at, Los_Angeles, Some(450.0)).unwrap();
    assert_eq!(high.current_rate, Some(0.31));
    assert_eq!(high.current_adjustment, Some(0.007));

    let none = plan.evaluate(at, Los_Angeles, None).unwrap();
    assert_eq!(none.current_rate, Some(0.24477));
    assert_eq!(none.monthly_tier_rate, None);
}

#[test]
fn plan_without_rates_is_malformed() {
    let mut doc = openei_document();
    doc["energyratestructure"] = json!([]);
    let plan: RatePlan = serde_json::from_value(doc).unwrap();
    let err = plan
        .evaluate(Utc::now(), Los_Angeles, None)
        .unwrap_err();
    assert!(err.is_malformed());
}

#[tokio::test]
async fn cache_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("openei_entry1");
    let plan: RatePlan = serde_json::from_value(openei_document()).unwrap();
    let fetched_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    PlanCache::new(&path)
        .save(&CachedPlan {
            label: plan.label.clone(),
            fetched_at,
            plan: plan.clone(),
        })
        .await
        .unwrap();

    let reopened = PlanCache::new(&path);
    let cached = reopened.load().await.unwrap();
    assert_eq!(cached.plan, plan);
    assert_eq!(cached.fetched_at, fetched_at);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["label"], json!("5e1676e95457a3f87673e3b0"));
}
