//! Built-in tools: weather, jokes, arithmetic and sandboxed code execution.
//!
//! Each tool is constructed via [`AgentTool::new`] and returned as
//! `Arc<dyn Tool>`. Network-backed tools report upstream failures as errors
//! so the agent loop can feed them back to the model; they never return an
//! empty value on failure.
//!
//! ```rust,no_run
//! use agentry::config::ToolSettings;
//! use agentry::tools::builtin::standard_tools;
//!
//! let tools = standard_tools(&ToolSettings::default());
//! assert!(tools.iter().any(|t| t.name() == "factorial"));
//! ```

use std::sync::Arc;

use serde::Deserialize;

use crate::config::ToolSettings;
use crate::error::AgentryError;
use crate::provider::http::{shared_client, status_to_error};
use crate::tools::tool::{AgentTool, Tool, ToolExecutionContext};
use crate::tools::types::ToolParameters;

/// Every tool enabled by `settings`. The weather tool needs an API key and the
/// code runner needs an executor URL; both are skipped otherwise.
pub fn standard_tools(settings: &ToolSettings) -> Vec<Arc<dyn Tool>> {
    let mut tools = vec![factorial_tool(), sum_tool(), joke_tool(settings.joke_base_url.clone())];
    match &settings.openweather_api_key {
        Some(key) => tools.push(weather_tool(key.clone(), settings.weather_base_url.clone())),
        None => tracing::warn!("OPENWEATHER_API_KEY not set; weather tool disabled"),
    }
    if let Some(url) = &settings.executor_url {
        tools.push(javascript_executor_tool(url.clone()));
    }
    tools
}

/// Create the `factorial` tool.
pub fn factorial_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "factorial",
        "calculate the factorial of a given number",
        ToolParameters::object()
            .integer("num", "The num to use for calculating factorial", Some(0), None, true)
            .build(),
        |args, _ctx: ToolExecutionContext| async move {
            let num = args.get_i64("num")?;
            let num = u64::try_from(num).map_err(|_| {
                AgentryError::InvalidArgument(format!("factorial is undefined for {num}"))
            })?;
            let value = factorial(num).ok_or_else(|| {
                AgentryError::InvalidArgument(format!("factorial of {num} overflows 64 bits"))
            })?;
            Ok(serde_json::json!(value))
        },
    ))
}

/// Exact factorial, `None` on overflow.
pub fn factorial(num: u64) -> Option<u64> {
    (1..=num).try_fold(1u64, |acc, n| acc.checked_mul(n))
}

/// Create the `sum` tool.
pub fn sum_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "sum",
        "Calculate the sum of two numbers.",
        ToolParameters::object()
            .number("a", "First number", true)
            .number("b", "Second number", true)
            .build(),
        |args, _ctx: ToolExecutionContext| async move {
            let raw = args.raw();
            if let (Some(a), Some(b)) = (raw["a"].as_i64(), raw["b"].as_i64()) {
                if let Some(total) = a.checked_add(b) {
                    return Ok(serde_json::json!(total));
                }
            }
            Ok(serde_json::json!(args.get_f64("a")? + args.get_f64("b")?))
        },
    ))
}

#[derive(Deserialize)]
struct WeatherResponse {
    weather: Vec<WeatherCondition>,
    main: WeatherMain,
}

#[derive(Deserialize)]
struct WeatherCondition {
    description: String,
}

#[derive(Deserialize)]
struct WeatherMain {
    temp: f64,
    humidity: f64,
}

/// Create the `weather` tool backed by the OpenWeatherMap current-weather API.
pub fn weather_tool(api_key: String, base_url: String) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "weather",
        "Get the weather in a given location",
        ToolParameters::object()
            .string("city", "The city to use in search", true)
            .build(),
        move |args, _ctx: ToolExecutionContext| {
            let api_key = api_key.clone();
            let base_url = base_url.clone();
            async move {
                let city = args.get_str("city")?.to_string();
                let resp = shared_client()
                    .get(format!("{}/weather", base_url.trim_end_matches('/')))
                    .query(&[("q", city.as_str()), ("appid", api_key.as_str()), ("units", "metric")])
                    .send()
                    .await?;

                let status = resp.status().as_u16();
                if status == 404 {
                    return Err(AgentryError::api(
                        404,
                        format!("City \"{city}\" not found or weather data unavailable."),
                    ));
                }
                if !(200..300).contains(&status) {
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(%city, status, "weather API error");
                    return Err(status_to_error(status, &body));
                }

                let data: WeatherResponse = resp.json().await?;
                let description = data
                    .weather
                    .first()
                    .map(|w| w.description.as_str())
                    .unwrap_or("unknown conditions");
                Ok(serde_json::json!(format!(
                    "Weather in {city}: {description}, temperature: {}°C, humidity: {}%",
                    data.main.temp, data.main.humidity
                )))
            }
        },
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JokeResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    joke: Option<String>,
    #[serde(default)]
    setup: Option<String>,
    #[serde(default)]
    delivery: Option<String>,
}

/// Create the `Joke` tool backed by JokeAPI v2.
pub fn joke_tool(base_url: String) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "Joke",
        "generates a joke on a given topic",
        ToolParameters::object()
            .string("topic", "the topic for which joke will be generated", true)
            .build(),
        move |args, _ctx: ToolExecutionContext| {
            let base_url = base_url.clone();
            async move {
                let topic = args.get_str("topic")?.to_string();
                let resp = shared_client()
                    .get(format!("{}/joke/Any", base_url.trim_end_matches('/')))
                    .query(&[("contains", topic.as_str())])
                    .send()
                    .await?;

                let status = resp.status().as_u16();
                let body = resp.text().await?;
                let parsed: Option<JokeResponse> = serde_json::from_str(&body).ok();
                let data = match parsed {
                    Some(data) if !data.error && (200..300).contains(&status) => data,
                    Some(data) => {
                        let message = data
                            .message
                            .unwrap_or_else(|| format!("no joke found about {topic}"));
                        return Err(AgentryError::api(status, message));
                    }
                    None => return Err(status_to_error(status, &body)),
                };

                let joke = match (data.joke, data.setup, data.delivery) {
                    (Some(joke), _, _) => joke,
                    (None, Some(setup), Some(delivery)) => format!("{setup} {delivery}"),
                    _ => {
                        return Err(AgentryError::api(status, "joke response had no content"));
                    }
                };
                Ok(serde_json::json!(joke))
            }
        },
    ))
}

/// Create the `run_javascript_code_tool`, which forwards code to a sandboxed executor service.
pub fn javascript_executor_tool(executor_url: String) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "run_javascript_code_tool",
        "Run general purpose javascript code. This can be used to access Internet or do any \
         computation that you need. The output will be composed of the stdout and stderr. \
         The code should be written in a way that it can be executed with javascript eval \
         in node environment.",
        ToolParameters::object()
            .string("code", "The code to run", true)
            .build(),
        move |args, _ctx: ToolExecutionContext| {
            let executor_url = executor_url.clone();
            async move {
                let code = args.get_str("code")?;
                let resp = shared_client()
                    .post(&executor_url)
                    .json(&serde_json::json!({ "code": code }))
                    .send()
                    .await?;

                let status = resp.status().as_u16();
                if !(200..300).contains(&status) {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(status_to_error(status, &body));
                }
                Ok(resp.json::<serde_json::Value>().await?)
            }
        },
    ))
}
