// src/source/uvi.rs
//
// Current UVI (housing unit of value) quote from the central bank's public
// statistics API. Used only when no current index is configured.

use crate::format::number::{decimal_from_f64, parse_decimal_text};
use anyhow::Result;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

const PRINCIPAL_VARIABLES_URL: &str =
    "https://api.bcra.gob.ar/estadisticas/v2.0/PrincipalesVariables";
const UVI_SERIES_URL: &str = "https://api.bcra.gob.ar/estadisticas/v2.0/datosvariable/100";
const UVI_VARIABLE_ID: i64 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

fn value_to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => n.as_f64().and_then(decimal_from_f64),
        Value::String(s) => parse_decimal_text(s, ','),
        _ => None,
    }
}

/// `{"results": [{"idVariable": 100, "valor": ...}, ...]}`
pub fn parse_principal_variables(body: &Value) -> Option<Decimal> {
    body.get("results")?
        .as_array()?
        .iter()
        .find(|v| v.get("idVariable").and_then(Value::as_i64) == Some(UVI_VARIABLE_ID))
        .and_then(|v| v.get("valor"))
        .and_then(value_to_decimal)
}

/// `{"results": [{"fecha": ..., "valor": ...}, ...]}`, newest first.
pub fn parse_variable_series(body: &Value) -> Option<Decimal> {
    body.get("results")?
        .as_array()?
        .first()?
        .get("valor")
        .and_then(value_to_decimal)
}

async fn get_json_once(client: &Client, url: &str) -> reqwest::Result<Value> {
    client
        .get(url)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await
}

async fn get_json(client: &Client, url: &str) -> Result<Value> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match get_json_once(client, url).await {
            Ok(body) => return Ok(body),
            Err(e) if attempt < MAX_RETRIES => {
                warn!(attempt, url, error = %e, "request failed, retrying");
                sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Try the summary endpoint, then the per-variable series. `Ok(None)` when
/// both answer but neither carries a usable quote.
#[instrument(level = "info", skip(client))]
pub async fn fetch_current_uvi(client: &Client) -> Result<Option<Decimal>> {
    // 1) summary of principal variables
    match get_json(client, PRINCIPAL_VARIABLES_URL).await {
        Ok(body) => {
            if let Some(v) = parse_principal_variables(&body) {
                info!(uvi = %v, "current UVI from principal variables");
                return Ok(Some(v));
            }
            warn!("UVI not present in principal variables");
        }
        Err(e) => warn!(error = %e, "principal variables request failed"),
    }

    // 2) variable series
    let body = get_json(client, UVI_SERIES_URL).await?;
    let value = parse_variable_series(&body);
    match &value {
        Some(v) => info!(uvi = %v, "current UVI from variable series"),
        None => warn!("UVI series returned no values"),
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn finds_uvi_among_principal_variables() {
        let body = json!({
            "status": 200,
            "results": [
                {"idVariable": 1, "descripcion": "Reservas", "valor": 27000},
                {"idVariable": 100, "descripcion": "UVI", "fecha": "2024-06-03", "valor": 1003.62}
            ]
        });
        assert_eq!(parse_principal_variables(&body), Some(dec!(1003.62)));
    }

    #[test]
    fn principal_variables_without_uvi() {
        let body = json!({"results": [{"idVariable": 1, "valor": 5}]});
        assert_eq!(parse_principal_variables(&body), None);
        assert_eq!(parse_principal_variables(&json!({"status": 500})), None);
    }

    #[test]
    fn series_takes_first_value() {
        let body = json!({
            "results": [
                {"fecha": "2024-06-03", "valor": "1.003,62"},
                {"fecha": "2024-06-02", "valor": 1001.1}
            ]
        });
        assert_eq!(parse_variable_series(&body), Some(dec!(1003.62)));
        assert_eq!(parse_variable_series(&json!({"results": []})), None);
    }
}
