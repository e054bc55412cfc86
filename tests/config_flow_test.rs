mod common;

use common::{MockRateClient, sample_record};
use openei_rates::config::HostConfig;
use openei_rates::config_flow::{
    ConfigFlow, CredentialsInput, FlowResult, PlanInput, StepId, UtilityInput,
};
use openei_rates::error::OpenEiError;

fn host() -> HostConfig {
    HostConfig {
        latitude: 37.5,
        longitude: -122.25,
        ..HostConfig::default()
    }
}

fn credentials() -> Option<CredentialsInput> {
    Some(CredentialsInput {
        api_key: "fakeAPIKey".into(),
        location: None,
        radius: Some(10.0),
    })
}

fn base_error(result: &FlowResult) -> Option<&str> {
    result
        .errors()
        .and_then(|e| e.get("base"))
        .map(String::as_str)
}

#[tokio::test]
async fn create_flow_walks_three_steps() {
    let client = MockRateClient::new();
    let mut flow = ConfigFlow::new(client.clone(), host());

    let form = flow.start().await;
    assert_eq!(form.step_id(), Some(StepId::User));

    let form = flow.step_user(credentials()).await;
    assert_eq!(form.step_id(), Some(StepId::User2));
    if let FlowResult::Form { fields, .. } = &form {
        let utilities: Vec<&str> = fields[0].options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(utilities, vec!["City Power", "Fake Utility Co"]);
    }

    let form = flow
        .step_user_2(Some(UtilityInput {
            utility: "Fake Utility Co".into(),
        }))
        .await;
    assert_eq!(form.step_id(), Some(StepId::User3));
    if let FlowResult::Form { fields, .. } = &form {
        assert_eq!(fields[0].key, "rate_plan");
        assert_eq!(fields[0].options[0].label, "Fake Plan Name");
    }

    let done = flow
        .step_user_3(Some(PlanInput {
            rate_plan: Some("randomstring".into()),
            sensor: Some("".into()),
            manual_plan: None,
        }))
        .await;

    match done {
        FlowResult::CreateEntry { title, record } => {
            assert_eq!(title, "Fake Utility Co");
            assert_eq!(record.title, "Fake Utility Co");
            assert_eq!(record.api_key, "fakeAPIKey");
            assert_eq!(record.rate_plan.as_deref(), Some("randomstring"));
            assert_eq!(record.sensor, None);
            assert_eq!(record.radius, Some(10.0));
            assert!(!record.entry_id.is_empty());
        }
        other => panic!("expected CreateEntry, got {:?}", other),
    }
    // The plan directory is looked up once per flow
    assert_eq!(client.lookup_calls(), 1);
}

#[tokio::test]
async fn lookup_failure_shows_cannot_connect() {
    let client = MockRateClient::new();
    client.fail_next_lookup(OpenEiError::network("dns failure"));
    let mut flow = ConfigFlow::new(client, host());

    let form = flow.step_user(credentials()).await;
    assert_eq!(form.step_id(), Some(StepId::User));
    assert_eq!(base_error(&form), Some("cannot_connect"));

    // Retrying after the outage proceeds
    let form = flow.step_user(credentials()).await;
    assert_eq!(form.step_id(), Some(StepId::User2));
}

#[tokio::test]
async fn rate_limited_lookup_shows_rate_limited() {
    let client = MockRateClient::new();
    client.fail_next_lookup(OpenEiError::rate_limited("OVER_RATE_LIMIT"));
    let mut flow = ConfigFlow::new(client, host());

    let form = flow.step_user(credentials()).await;
    assert_eq!(base_error(&form), Some("rate_limited"));
}

#[tokio::test]
async fn unknown_choices_are_field_errors() {
    let mut flow = ConfigFlow::new(MockRateClient::new(), host());
    flow.step_user(credentials()).await;

    let form = flow
        .step_user_2(Some(UtilityInput {
            utility: "Nope Power".into(),
        }))
        .await;
    assert_eq!(form.step_id(), Some(StepId::User2));
    assert_eq!(
        form.errors().unwrap().get("utility").map(String::as_str),
        Some("invalid_utility")
    );

    flow.step_user_2(Some(UtilityInput {
        utility: "City Power".into(),
    }))
    .await;
    let form = flow
        .step_user_3(Some(PlanInput {
            rate_plan: Some("randomstring".into()),
            ..PlanInput::default()
        }))
        .await;
    assert_eq!(form.step_id(), Some(StepId::User3));
    assert_eq!(
        form.errors().unwrap().get("rate_plan").map(String::as_str),
        Some("invalid_plan")
    );
}

#[tokio::test]
async fn manual_plan_is_accepted_without_listed_plan() {
    let mut flow = ConfigFlow::new(MockRateClient::new(), host());
    flow.step_user(credentials()).await;
    flow.step_user_2(Some(UtilityInput {
        utility: "City Power".into(),
    }))
    .await;

    let done = flow
        .step_user_3(Some(PlanInput {
            rate_plan: None,
            sensor: Some("sensor.fake_sensor_1".into()),
            manual_plan: Some("5e1676e95457a3f87673e3b0".into()),
        }))
        .await;
    let FlowResult::CreateEntry { record, .. } = done else {
        panic!("expected CreateEntry");
    };
    assert_eq!(record.effective_plan(), Some("5e1676e95457a3f87673e3b0"));
    assert_eq!(record.sensor.as_deref(), Some("sensor.fake_sensor_1"));
}

#[tokio::test]
async fn reconfigure_keeps_entry_identity() {
    let existing = sample_record();
    let mut flow = ConfigFlow::reconfigure(MockRateClient::new(), host(), existing.clone());

    let form = flow.start().await;
    assert_eq!(form.step_id(), Some(StepId::Reconfigure));
    if let FlowResult::Form { fields, .. } = &form {
        assert_eq!(fields[0].default.as_deref(), Some("fakeAPIKey"));
    }

    let form = flow.step_user(credentials()).await;
    assert_eq!(form.step_id(), Some(StepId::Reconfig2));
    if let FlowResult::Form { fields, .. } = &form {
        assert_eq!(fields[0].default.as_deref(), Some("Fake Utility Co"));
    }

    let form = flow
        .step_user_2(Some(UtilityInput {
            utility: "Fake Utility Co".into(),
        }))
        .await;
    assert_eq!(form.step_id(), Some(StepId::Reconfig3));

    let done = flow
        .step_user_3(Some(PlanInput {
            rate_plan: Some("touplan".into()),
            ..PlanInput::default()
        }))
        .await;
    let FlowResult::UpdateEntry { record } = done else {
        panic!("expected UpdateEntry");
    };
    assert_eq!(record.entry_id, existing.entry_id);
    assert_eq!(record.title, existing.title);
    assert_eq!(record.rate_plan.as_deref(), Some("touplan"));
}
