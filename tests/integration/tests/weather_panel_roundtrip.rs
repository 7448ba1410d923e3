use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use minicline_protobus::{
    CallError, ChannelEndpoint, HostServeReport, MessageChannel, MessagePort, ProtoBusClient,
    ProtoBusHost,
};
use minicline_weather::{
    weather_service_handlers, Controller, CurrentConditions, GetWeatherRequest,
    GetWeatherResponse, TemperatureUnit, WeatherPanel, WeatherProvider, WeatherProviderError,
    WeatherQuery, WeatherServiceClient,
};
use serde_json::json;
use tokio::{
    sync::{Mutex as AsyncMutex, Notify},
    task::JoinHandle,
};

enum Script {
    Conditions(&'static str, &'static str),
    Failure(&'static str),
}

struct ScriptedProvider {
    scripts: HashMap<&'static str, Script>,
    gates: HashMap<&'static str, Arc<Notify>>,
    queries: AsyncMutex<Vec<WeatherQuery>>,
}

impl ScriptedProvider {
    fn new(scripts: Vec<(&'static str, Script)>) -> Self {
        Self {
            scripts: scripts.into_iter().collect(),
            gates: HashMap::new(),
            queries: AsyncMutex::new(Vec::new()),
        }
    }

    fn gated(mut self, location: &'static str, gate: Arc<Notify>) -> Self {
        self.gates.insert(location, gate);
        self
    }

    async fn query_count(&self) -> usize {
        self.queries.lock().await.len()
    }
}

#[async_trait]
impl WeatherProvider for ScriptedProvider {
    async fn current_conditions(
        &self,
        query: &WeatherQuery,
    ) -> Result<CurrentConditions, WeatherProviderError> {
        self.queries.lock().await.push(query.clone());
        if let Some(gate) = self.gates.get(query.location.as_str()) {
            gate.notified().await;
        }
        match self.scripts.get(query.location.as_str()) {
            Some(Script::Conditions(skytext, temperature)) => Ok(CurrentConditions {
                skytext: (*skytext).to_string(),
                temperature: (*temperature).to_string(),
                degree_type: query.unit,
            }),
            Some(Script::Failure(message)) => {
                Err(WeatherProviderError::Unavailable((*message).to_string()))
            }
            None => Err(WeatherProviderError::NoResults(query.location.clone())),
        }
    }
}

struct PanelHarness {
    provider: Arc<ScriptedProvider>,
    webview: ChannelEndpoint,
    bus: ProtoBusClient,
    server: JoinHandle<HostServeReport>,
}

impl PanelHarness {
    async fn start(provider: ScriptedProvider) -> Self {
        let provider = Arc::new(provider);
        let controller = Arc::new(Controller::new(provider.clone()));
        let handlers = Arc::new(weather_service_handlers().expect("weather handlers"));
        let (host_end, webview) = MessageChannel::pair();
        let host = ProtoBusHost::new(controller, handlers, Arc::new(host_end.clone()));
        let server = tokio::spawn(async move { host.serve().await });
        while host_end.listener_count() == 0 {
            tokio::task::yield_now().await;
        }
        let bus = ProtoBusClient::new(Arc::new(webview.clone()));
        Self {
            provider,
            webview,
            bus,
            server,
        }
    }

    fn weather(&self) -> WeatherServiceClient {
        WeatherServiceClient::new(self.bus.clone())
    }

    async fn shutdown(self) -> HostServeReport {
        self.webview.close();
        self.server.await.expect("serve task should join")
    }
}

fn request(location: &str) -> GetWeatherRequest {
    GetWeatherRequest {
        location: location.to_string(),
        unit: TemperatureUnit::Fahrenheit,
    }
}

#[tokio::test]
async fn integration_panel_loads_current_weather_over_the_bus() {
    let harness = PanelHarness::start(ScriptedProvider::new(vec![(
        "Seattle, WA",
        Script::Conditions("Sunny", "72"),
    )]))
    .await;
    let mut observer = harness.webview.add_listener();

    let pending = harness
        .bus
        .call(
            "WeatherService",
            "getWeather",
            json!({"location": "Seattle, WA", "unit": "F"}),
        )
        .expect("post request");
    let request_id = pending.request_id().to_string();
    let response = pending.response().await.expect("weather response");

    assert_eq!(response.request_id, request_id);
    assert_eq!(
        response.message,
        json!({"skytext": "Sunny", "temperature": "72", "degreeType": "F"})
    );
    let wire = observer.recv().await.expect("response observed on channel");
    assert_eq!(wire["type"], "grpc_response");
    assert_eq!(wire["grpc_response"]["request_id"], json!(request_id));
    drop(observer);

    let typed = harness
        .weather()
        .get_weather(&request("Seattle, WA"))
        .await;
    assert_eq!(
        typed.as_ref().expect("typed call"),
        &GetWeatherResponse {
            skytext: "Sunny".to_string(),
            temperature: "72".to_string(),
            degree_type: "F".to_string(),
        }
    );
    assert_eq!(WeatherPanel::from_result(&typed).render(), "☀️ Sunny, 72F");
    assert_eq!(harness.provider.query_count().await, 2);
    assert_eq!(harness.webview.listener_count(), 0);

    let report = harness.shutdown().await;
    assert_eq!(report.responses_sent, 2);
    assert_eq!(report.error_responses, 0);
}

#[tokio::test]
async fn integration_provider_failure_reaches_panel_verbatim() {
    let harness = PanelHarness::start(ScriptedProvider::new(vec![(
        "Seattle, WA",
        Script::Failure("network unavailable"),
    )]))
    .await;

    let result = harness.weather().get_weather(&request("Seattle, WA")).await;
    match &result {
        Err(CallError::Remote { message, .. }) => assert_eq!(message, "network unavailable"),
        other => panic!("expected remote error, got {other:?}"),
    }
    assert_eq!(
        WeatherPanel::from_result(&result),
        WeatherPanel::Failed("network unavailable".to_string())
    );

    let report = harness.shutdown().await;
    assert_eq!(report.error_responses, 1);
}

#[tokio::test]
async fn integration_unknown_service_is_rejected_without_lookup() {
    let harness = PanelHarness::start(ScriptedProvider::new(Vec::new())).await;

    let error = harness
        .bus
        .call("UnknownService", "x", json!({}))
        .expect("post request")
        .response()
        .await
        .expect_err("unknown service");
    assert!(error.to_string().contains("Unknown service: UnknownService"));

    let unknown_rpc = harness
        .bus
        .call("WeatherService", "getForecast", json!({}))
        .expect("post request")
        .response()
        .await
        .expect_err("unknown rpc");
    assert_eq!(
        unknown_rpc.to_string(),
        "Unknown rpc: WeatherService.getForecast"
    );
    assert_eq!(harness.provider.query_count().await, 0);
    harness.shutdown().await;
}

#[tokio::test]
async fn integration_out_of_order_responses_resolve_their_own_callers() {
    let gate = Arc::new(Notify::new());
    let provider = ScriptedProvider::new(vec![
        ("Boston", Script::Conditions("Cloudy", "41")),
        ("Austin", Script::Conditions("Mostly Sunny", "88")),
    ])
    .gated("Boston", Arc::clone(&gate));
    let harness = PanelHarness::start(provider).await;
    let weather = harness.weather();

    let first = {
        let weather = weather.clone();
        tokio::spawn(async move { weather.get_weather(&request("Boston")).await })
    };
    while harness.provider.query_count().await == 0 {
        tokio::task::yield_now().await;
    }

    let second = weather
        .get_weather(&request("Austin"))
        .await
        .expect("second call resolves first");
    assert_eq!(second.skytext, "Mostly Sunny");
    assert!(!first.is_finished());

    gate.notify_one();
    let first = first
        .await
        .expect("first task joins")
        .expect("first call resolves");
    assert_eq!(first.skytext, "Cloudy");
    assert_eq!(first.temperature, "41");
    assert_eq!(harness.webview.listener_count(), 0);
    harness.shutdown().await;
}

#[tokio::test]
async fn regression_unhandled_webview_traffic_does_not_stop_the_host() {
    let harness = PanelHarness::start(ScriptedProvider::new(vec![(
        "Seattle, WA",
        Script::Conditions("Rain Showers", "55"),
    )]))
    .await;

    harness
        .webview
        .post_message(json!({"type": "ready"}))
        .expect("post unrelated message");
    harness
        .webview
        .post_message(json!({"type": "grpc_request"}))
        .expect("post request without payload");

    let response = harness
        .weather()
        .get_weather(&request("Seattle, WA"))
        .await
        .expect("host keeps serving");
    assert_eq!(
        WeatherPanel::loaded(&response).render(),
        "🌦 Rain Showers, 55F"
    );

    let report = harness.shutdown().await;
    assert_eq!(report.ignored_messages, 2);
    assert_eq!(report.responses_sent, 1);
}
