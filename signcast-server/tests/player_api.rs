//! Router-level tests for the player-facing HTTP API.
//!
//! Run with: cargo test --test player_api

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use signcast_core::models::{ContentKind, DaySet, Transition};
use signcast_core::origin::SyncOriginStore;
use signcast_core::{Config, Registry};
use signcast_server::{create_router, AppState};

fn test_state() -> AppState {
    let mut config = Config::default();
    config.server.register_rate_per_minute = 0;
    AppState::new(config, Registry::new(), SyncOriginStore::in_memory())
}

/// Group with A (image 10s), B (image 5s), C (video 20s) and an all-day
/// schedule, bound to a fresh device. Returns the device's access code.
fn seed_playing_device(state: &AppState) -> String {
    let group = state.registry.create_group("Lobby", Transition::dissolve(0.5));
    state
        .registry
        .create_schedule(
            group.id,
            "All day",
            "00:00".parse().unwrap(),
            "23:59".parse().unwrap(),
            DaySet::ALL,
            0,
        )
        .unwrap();
    state
        .registry
        .add_content(group.id, "A", "a.png", ContentKind::Image, 100, 10.0)
        .unwrap();
    state
        .registry
        .add_content(group.id, "B", "b.png", ContentKind::Image, 100, 5.0)
        .unwrap();
    state
        .registry
        .add_content(
            group.id,
            "C",
            "c.mp4",
            ContentKind::Video {
                intrinsic_duration: Some(20.0),
            },
            100,
            10.0,
        )
        .unwrap();

    let device = state.registry.create_device("kiosk");
    state
        .registry
        .assign_group(device.id, Some(group.id))
        .unwrap();
    device.access_code.as_str().to_string()
}

fn register_request(code: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/player/register")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("access_code={code}")))
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    req
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn register_round_trip_is_idempotent() {
    let state = test_state();
    let app = create_router(state.clone());
    let code = seed_playing_device(&state);

    for _ in 0..2 {
        let response = app.clone().oneshot(register_request(&code)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["device_name"], "kiosk");
    }
}

#[tokio::test]
async fn register_unknown_code_is_404() {
    let state = test_state();
    let app = create_router(state);

    let response = app.oneshot(register_request("999999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn register_inactive_device_is_403() {
    let state = test_state();
    let app = create_router(state.clone());

    let device = state.registry.create_device("dark-kiosk");
    state.registry.set_device_active(device.id, false).unwrap();

    let response = app
        .oneshot(register_request(device.access_code.as_str()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn register_malformed_code_is_400() {
    let state = test_state();
    let app = create_router(state);

    let response = app.oneshot(register_request("12ab")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_is_rate_limited_per_ip() {
    let mut config = Config::default();
    config.server.register_rate_per_minute = 2;
    let state = AppState::new(config, Registry::new(), SyncOriginStore::in_memory());
    let app = create_router(state.clone());
    let code = seed_playing_device(&state);

    for _ in 0..2 {
        let response = app.clone().oneshot(register_request(&code)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.oneshot(register_request(&code)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn playlist_contract_shape() {
    let state = test_state();
    let app = create_router(state.clone());
    let code = seed_playing_device(&state);

    let (status, json) = get_json(&app, &format!("/player/{code}/playlist")).await;
    assert_eq!(status, StatusCode::OK);

    let playlist = json["playlist"].as_array().unwrap();
    assert_eq!(playlist.len(), 3);
    assert_eq!(playlist[0]["name"], "A");
    assert_eq!(playlist[0]["file_type"], "image");
    assert_eq!(playlist[0]["display_duration"], 10.0);
    assert!(playlist[0]["url"]
        .as_str()
        .unwrap()
        .starts_with("/uploads/content/"));
    // Videos expose the intrinsic duration; images omit the field.
    assert_eq!(playlist[2]["duration"], 20.0);
    assert!(playlist[0].get("duration").is_none());

    assert_eq!(json["transition"]["type"], "dissolve");
    assert_eq!(json["transition"]["duration"], 0.5);
    assert_eq!(json["device"]["orientation"], "landscape");
    assert_eq!(json["device"]["flip_horizontal"], false);

    assert_eq!(json["sync"]["total_duration"], 35.0);
    assert!(json["sync"]["start_time"].as_f64().unwrap() > 0.0);

    let checks = json["debug"]["schedule_check_results"].as_array().unwrap();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0]["selected"], true);
    assert_eq!(checks[0]["day_match"], true);
    assert_eq!(checks[0]["time_match"], true);
    assert_eq!(json["debug"]["total_content"], 3);
    assert_eq!(json["debug"]["fallback_mode"], false);
    assert_eq!(json["active_schedule"]["name"], "All day");
}

#[tokio::test]
async fn playlist_with_no_matching_schedule_is_empty_with_fallback_flag() {
    let state = test_state();
    let app = create_router(state.clone());

    let group = state.registry.create_group("Lobby", Transition::cut());
    // Empty day mask: never matches.
    state
        .registry
        .create_schedule(
            group.id,
            "Never",
            "00:00".parse().unwrap(),
            "23:59".parse().unwrap(),
            DaySet::EMPTY,
            0,
        )
        .unwrap();
    state
        .registry
        .add_content(group.id, "A", "a.png", ContentKind::Image, 100, 10.0)
        .unwrap();
    let device = state.registry.create_device("kiosk");
    state
        .registry
        .assign_group(device.id, Some(group.id))
        .unwrap();

    let (status, json) = get_json(
        &app,
        &format!("/player/{}/playlist", device.access_code.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["playlist"].as_array().unwrap().is_empty());
    assert!(json["active_schedule"].is_null());
    assert_eq!(json["debug"]["fallback_mode"], true);
}

#[tokio::test]
async fn playlist_priority_conflict_marks_one_selected() {
    let state = test_state();
    let app = create_router(state.clone());

    let group = state.registry.create_group("Lobby", Transition::cut());
    state
        .registry
        .create_schedule(
            group.id,
            "base",
            "00:00".parse().unwrap(),
            "23:59".parse().unwrap(),
            DaySet::ALL,
            0,
        )
        .unwrap();
    state
        .registry
        .create_schedule(
            group.id,
            "override",
            "00:00".parse().unwrap(),
            "23:59".parse().unwrap(),
            DaySet::ALL,
            5,
        )
        .unwrap();
    state
        .registry
        .add_content(group.id, "A", "a.png", ContentKind::Image, 100, 10.0)
        .unwrap();
    let device = state.registry.create_device("kiosk");
    state
        .registry
        .assign_group(device.id, Some(group.id))
        .unwrap();

    let (_, json) = get_json(
        &app,
        &format!("/player/{}/playlist", device.access_code.as_str()),
    )
    .await;
    assert_eq!(json["active_schedule"]["name"], "override");
    let selected: Vec<bool> = json["debug"]["schedule_check_results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["selected"].as_bool().unwrap())
        .collect();
    assert_eq!(selected.iter().filter(|&&s| s).count(), 1);
}

#[tokio::test]
async fn playlist_origin_is_stable_until_composition_changes() {
    let state = test_state();
    let app = create_router(state.clone());
    let code = seed_playing_device(&state);
    let uri = format!("/player/{code}/playlist");

    let (_, first) = get_json(&app, &uri).await;
    let (_, second) = get_json(&app, &uri).await;
    assert_eq!(first["sync"]["start_time"], second["sync"]["start_time"]);

    // Deactivate item B: composition changes, origin re-mints, cycle = 30.
    let group_id = state.registry.groups()[0].id;
    let b = state
        .registry
        .content_for_group(group_id)
        .into_iter()
        .find(|i| i.name == "B")
        .unwrap();
    state.registry.set_content_active(b.id, false).unwrap();

    let (_, third) = get_json(&app, &uri).await;
    assert_eq!(third["sync"]["total_duration"], 30.0);
    assert!(
        third["sync"]["start_time"].as_f64().unwrap()
            >= first["sync"]["start_time"].as_f64().unwrap()
    );
    assert_ne!(first["sync"]["start_time"], third["sync"]["start_time"]);
}

#[tokio::test]
async fn playlist_unknown_code_is_404_and_inactive_is_403() {
    let state = test_state();
    let app = create_router(state.clone());

    let (status, _) = get_json(&app, "/player/123456/playlist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let device = state.registry.create_device("kiosk");
    state.registry.set_device_active(device.id, false).unwrap();
    let (status, _) = get_json(
        &app,
        &format!("/player/{}/playlist", device.access_code.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn config_fetch_marks_device_online() {
    let state = test_state();
    let app = create_router(state.clone());
    let code = seed_playing_device(&state);

    let (status, json) = get_json(&app, &format!("/player/{code}/config")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["device"]["name"], "kiosk");
    assert!(json["server_time"].as_f64().unwrap() > 0.0);
    assert_eq!(json["default_display"]["background_mode"], "solid");

    let device = state.registry.devices()[0].clone();
    assert!(device.is_online);
    assert!(device.last_seen.is_some());
}

#[tokio::test]
async fn content_change_notifies_bound_players_only() {
    use signcast_server::events::ServerEvent;

    let state = test_state();
    seed_playing_device(&state);
    let group_id = state.registry.groups()[0].id;
    let bound = state.registry.devices()[0].clone();

    let other = state.registry.create_device("unbound-kiosk");

    let (_id, mut bound_rx) = state.events.register(bound.access_code.as_str());
    let (_id, mut other_rx) = state.events.register(other.access_code.as_str());

    state.notify_group(group_id, ServerEvent::ContentUpdated);

    assert_eq!(bound_rx.recv().await, Some(ServerEvent::ContentUpdated));
    assert!(other_rx.try_recv().is_err());

    state.notify_all(ServerEvent::DefaultDisplayUpdated);
    assert_eq!(
        other_rx.recv().await,
        Some(ServerEvent::DefaultDisplayUpdated)
    );
}

#[tokio::test]
async fn time_and_discover_endpoints() {
    let state = test_state();
    let app = create_router(state);

    let (status, json) = get_json(&app, "/time").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["time"].as_f64().unwrap() > 0.0);

    let (status, json) = get_json(&app, "/discover").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Signcast Server");
    assert_eq!(json["port"], 8000);
    assert!(json["version"].as_str().is_some());
}
