use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use minicline_protobus::{
    HostServeReport, MalformedResponsePolicy, MessageChannel, ProtoBusClient,
    ProtoBusClientConfig, ProtoBusHost, ServiceHandlers,
};
use minicline_weather::{
    weather_service_handlers, Controller, GetWeatherRequest, HttpWeatherProvider,
    HttpWeatherProviderConfig, WeatherPanel, WeatherServiceClient,
};

use crate::cli_args::Cli;

/// Panel state after one `getWeather` round trip, plus what the host saw.
#[derive(Debug)]
pub(crate) struct WeatherRunOutcome {
    pub(crate) panel: WeatherPanel,
    pub(crate) report: HostServeReport,
}

pub(crate) fn client_config_from_cli(cli: &Cli) -> ProtoBusClientConfig {
    ProtoBusClientConfig {
        malformed_response_policy: if cli.reject_malformed_responses {
            MalformedResponsePolicy::Reject
        } else {
            MalformedResponsePolicy::LogAndWait
        },
        default_timeout: (cli.call_timeout_ms > 0)
            .then(|| Duration::from_millis(cli.call_timeout_ms)),
    }
}

pub(crate) fn build_controller(cli: &Cli) -> Result<Controller> {
    let provider = HttpWeatherProvider::new(HttpWeatherProviderConfig {
        base_url: cli.weather_base_url.clone(),
        timeout_ms: cli.weather_timeout_ms,
    })
    .context("failed to build weather provider")?;
    Ok(Controller::new(Arc::new(provider)))
}

pub(crate) fn render_service_listing(handlers: &ServiceHandlers<Controller>) -> String {
    let mut lines = Vec::new();
    for service in handlers.services() {
        for method in handlers.methods(service) {
            lines.push(format!("{service}.{method}"));
        }
    }
    lines.join("\n")
}

pub(crate) async fn run_weather_request(cli: &Cli) -> Result<WeatherRunOutcome> {
    let controller = Arc::new(build_controller(cli)?);
    let handlers = Arc::new(weather_service_handlers().context("invalid dispatch table")?);
    let (host_end, webview_end) = MessageChannel::pair();

    let host = ProtoBusHost::new(controller, handlers, Arc::new(host_end.clone()));
    let server = tokio::spawn(async move { host.serve().await });
    while host_end.listener_count() == 0 {
        tokio::task::yield_now().await;
    }

    let client = WeatherServiceClient::new(ProtoBusClient::with_config(
        Arc::new(webview_end.clone()),
        client_config_from_cli(cli),
    ));
    let request = GetWeatherRequest {
        location: cli.location.clone(),
        unit: cli.unit,
    };
    tracing::debug!(location = %request.location, unit = %request.unit, "requesting weather");
    let result = client.get_weather(&request).await;
    let panel = WeatherPanel::from_result(&result);

    webview_end.close();
    let report = server.await.context("host serve task failed")?;
    tracing::debug!(?report, "host serve loop finished");
    Ok(WeatherRunOutcome { panel, report })
}

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    if cli.list_services {
        let handlers = weather_service_handlers().context("invalid dispatch table")?;
        println!("{}", render_service_listing(&handlers));
        return Ok(());
    }

    println!("Current Weather");
    println!("{}", WeatherPanel::Loading.render());
    let outcome = run_weather_request(&cli).await?;
    match &outcome.panel {
        WeatherPanel::Failed(message) => bail!("weather request failed: {message}"),
        panel => println!("{}", panel.render()),
    }
    Ok(())
}
