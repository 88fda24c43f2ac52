//! HTTP surface tests against an in-process server on an ephemeral port.
mod common;

use std::sync::Arc;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use common::{engine, fixture_store};

// ---

/// Serve the fixture on 127.0.0.1:0 and return its base URL.
async fn spawn_server() -> Result<String> {
    // ---
    let (engine, _) = engine(fixture_store().await);
    let app = sensorhub::routes::router(Arc::new(engine));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(format!("http://{addr}"))
}

async fn get(base: &str, path: &str) -> Result<(StatusCode, Value)> {
    // ---
    let response = Client::new().get(format!("{base}{path}")).send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    Ok((status, body))
}

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    // ---
    let base = spawn_server().await?;
    let (status, body) = get(&base, "/health").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    Ok(())
}

#[tokio::test]
async fn group_average_endpoints() -> Result<()> {
    // ---
    let base = spawn_server().await?;

    let (status, body) = get(&base, "/group/alpha/temperature/average").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["group"], "alpha");
    assert_eq!(body["averageTemperature"].as_f64(), Some(12.0));

    let (status, body) = get(&base, "/group/alpha/transparency/average").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["averageTransparency"].as_f64(), Some(50.0));

    let (status, body) = get(&base, "/group/gamma/temperature/average").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("gamma"));
    Ok(())
}

#[tokio::test]
async fn species_endpoints() -> Result<()> {
    // ---
    let base = spawn_server().await?;

    let (status, body) = get(&base, "/group/beta/species").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["speciesList"]["Tuna"], 5);
    assert_eq!(body["speciesList"]["Trout"], 3);

    let (status, body) = get(&base, "/group/beta/species/top/2").await?;
    assert_eq!(status, StatusCode::OK);
    let ranked = body["speciesList"].as_array().unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0]["species"], "Tuna");
    assert_eq!(ranked[0]["count"], 5);
    assert_eq!(ranked[1]["species"], "Cod");

    let (status, body) = get(&base, "/group/beta/species/top/5?from=1050&till=1080").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["speciesList"].as_array().unwrap().len(), 2);

    let (status, _) = get(&base, "/group/beta/species/top/two").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&base, "/group/beta/species/top/2?from=2000&till=1000").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn region_endpoints() -> Result<()> {
    // ---
    let base = spawn_server().await?;
    let around_alpha = "xMin=0&xMax=4&yMin=0&yMax=4&zMin=0&zMax=4";

    let (status, body) = get(&base, &format!("/region/temperature/min?{around_alpha}")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Min Temperature"].as_f64(), Some(10.0));

    let (status, body) = get(&base, &format!("/region/temperature/max?{around_alpha}")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Max Temperature"].as_f64(), Some(14.0));

    let empty = "xMin=5&xMax=6&yMin=5&yMax=6&zMin=5&zMax=6";
    let (status, body) = get(&base, &format!("/region/temperature/max?{empty}")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Max Temperature"].as_f64(), Some(0.0));

    let (status, _) = get(&base, "/region/temperature/min?xMin=0&xMax=4").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let inverted = "xMin=4&xMax=0&yMin=0&yMax=4&zMin=0&zMax=4";
    let (status, _) = get(&base, &format!("/region/temperature/min?{inverted}")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn sensor_average_endpoint() -> Result<()> {
    // ---
    let base = spawn_server().await?;

    let (status, body) = get(&base, "/sensor/alpha2/temperature/average?from=0&till=200").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["codeName"], "alpha2");
    assert_eq!(body["averageTemperature"].as_f64(), Some(12.0));

    let (status, _) = get(&base, "/sensor/alpha2/temperature/average?from=0").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&base, "/sensor/alpha2/temperature/average?from=300&till=400").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&base, "/sensor/nobody/temperature/average?from=0&till=200").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
