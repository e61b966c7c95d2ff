#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::models::{Episode, StoryArc};
    use crate::routes::{router, AppState};
    use crate::store::Store;

    const TOKEN: &str = "let-me-in";

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_arc(&StoryArc {
                id: 1,
                name: "East Blue".to_string(),
                start_episode: 1,
                end_episode: 4,
                description: None,
            })
            .unwrap();
        for id in 1..=4 {
            store
                .upsert_episode(&Episode {
                    id,
                    title: format!("Episode {id}"),
                    airdate: NaiveDate::from_ymd_opt(1999, 10, 20 + id as u32),
                    arc_id: if id == 4 { None } else { Some(1) },
                })
                .unwrap();
        }
        store
    }

    fn app(admin_token: Option<&str>, max_chart_days: i64) -> Router {
        let config = Config {
            admin_token: admin_token.map(str::to_string),
            max_chart_days,
            ..Config::default()
        };
        router(AppState {
            store: Arc::new(seeded_store()),
            config: Arc::new(config),
        })
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn log(app: &Router, episode_id: i64, date: &str) -> (StatusCode, Value) {
        let body = json!({ "episode_id": episode_id, "watched_date": date });
        send(app, request(Method::POST, "/watch-history", Some(TOKEN), Some(body))).await
    }

    #[tokio::test]
    async fn test_reads_are_public() {
        let app = app(Some(TOKEN), 365);

        let (status, body) = send(&app, request(Method::GET, "/episodes?limit=2", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["episodes"].as_array().unwrap().len(), 2);
        assert_eq!(body["episodes"][0]["arc_name"], "East Blue");

        let (status, _) = send(&app, request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_writes_require_admin_token() {
        let app = app(Some(TOKEN), 365);
        let body = json!({ "episode_id": 1, "watched_date": "2024-06-01" });

        let (status, error) = send(
            &app,
            request(Method::POST, "/watch-history", None, Some(body.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error, json!({ "error": "Unauthorized" }));

        let (status, _) = send(
            &app,
            request(Method::POST, "/watch-history", Some("wrong"), Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, request(Method::DELETE, "/watch-history/1", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_writes_rejected_without_configured_token() {
        let app = app(None, 365);
        let body = json!({ "episode_id": 1, "watched_date": "2024-06-01" });

        let (status, _) = send(
            &app,
            request(Method::POST, "/watch-history", Some(TOKEN), Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_log_episode_lifecycle() {
        let app = app(Some(TOKEN), 365);

        let (status, created) = log(&app, 2, "2024-06-01").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["watchEntry"]["episode_id"], 2);
        assert_eq!(created["watchEntry"]["watched_date"], "2024-06-01");
        assert_eq!(created["watchEntry"]["episode"]["arc_name"], "East Blue");
        let id = created["watchEntry"]["id"].as_i64().unwrap();

        let (status, error) = log(&app, 2, "2024-06-02").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["error"], "Episode already watched. Use PUT to update.");

        let uri = format!("/watch-history/{id}");
        let (status, updated) = send(
            &app,
            request(Method::PUT, &uri, Some(TOKEN), Some(json!({ "watched_date": "2024-06-05" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["watchEntry"]["watched_date"], "2024-06-05");

        let (status, deleted) = send(&app, request(Method::DELETE, &uri, Some(TOKEN), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["message"], "Watch entry deleted successfully");

        let (status, _) = send(&app, request(Method::DELETE, &uri, Some(TOKEN), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_log_episode_validation() {
        let app = app(Some(TOKEN), 365);

        let (status, error) = send(
            &app,
            request(Method::POST, "/watch-history", Some(TOKEN), Some(json!({ "episode_id": 1 }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], "episode_id and watched_date are required");

        let (status, _) = log(&app, 1, "June 1st").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = log(&app, 99, "2024-06-01").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            request(Method::PUT, "/watch-history/42", Some(TOKEN), Some(json!({ "watched_date": "2024-06-05" }))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_watch_history_limit() {
        let app = app(Some(TOKEN), 365);
        log(&app, 1, "2024-06-01").await;
        log(&app, 2, "2024-06-03").await;
        log(&app, 3, "2024-06-02").await;

        let (status, body) = send(&app, request(Method::GET, "/watch-history?limit=2", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        let history = body["watchHistory"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["episode_id"], 2);
        assert_eq!(history[1]["episode_id"], 3);
    }

    #[tokio::test]
    async fn test_progress() {
        let app = app(Some(TOKEN), 365);
        log(&app, 1, "2024-06-01").await;
        log(&app, 3, "2024-06-02").await;

        let (status, body) = send(&app, request(Method::GET, "/progress", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "latestAvailable": 4,
                "highestWatched": 3,
                "progressPercentage": 75,
                "totalWatched": 2,
                "isCaughtUp": false,
            })
        );
    }

    #[tokio::test]
    async fn test_analytics_fills_gaps() {
        let app = app(Some(TOKEN), 365);
        log(&app, 1, "2024-06-01").await;
        log(&app, 2, "2024-06-01").await;
        log(&app, 4, "2024-06-03").await;

        let (status, body) = send(
            &app,
            request(Method::GET, "/analytics?start_date=2024-06-01&end_date=2024-06-04", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalEpisodes"], 3);
        assert_eq!(
            body["chartData"],
            json!([
                { "date": "Jun 01", "fullDate": "2024-06-01", "East Blue": 2 },
                { "date": "Jun 02", "fullDate": "2024-06-02" },
                { "date": "Jun 03", "fullDate": "2024-06-03", "Unknown Arc": 1 },
                { "date": "Jun 04", "fullDate": "2024-06-04" },
            ])
        );
    }

    #[tokio::test]
    async fn test_analytics_infers_range() {
        let app = app(Some(TOKEN), 365);
        log(&app, 1, "2024-01-03").await;
        log(&app, 2, "2024-01-07").await;

        let (status, body) = send(&app, request(Method::GET, "/analytics", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chartData"].as_array().unwrap().len(), 5);
        assert_eq!(body["chartData"][4]["fullDate"], "2024-01-07");
    }

    #[tokio::test]
    async fn test_analytics_empty() {
        let app = app(Some(TOKEN), 365);

        let (status, body) = send(&app, request(Method::GET, "/analytics", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "chartData": [], "totalEpisodes": 0, "episodesThisWeek": 0 })
        );
    }

    #[tokio::test]
    async fn test_analytics_rejects_bad_input() {
        let app = app(Some(TOKEN), 31);

        let (status, body) = send(
            &app,
            request(Method::GET, "/analytics?start_date=2024-02-30", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid date '2024-02-30', expected YYYY-MM-DD");

        let (status, _) = send(
            &app,
            request(Method::GET, "/analytics?start_date=2024-01-01&end_date=2024-12-31", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analytics_inferred_span_is_not_capped() {
        let app = app(Some(TOKEN), Config::default().max_chart_days);
        log(&app, 1, "2010-01-01").await;
        log(&app, 2, "2024-06-01").await;

        let (status, body) = send(&app, request(Method::GET, "/analytics", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalEpisodes"], 2);
        let chart = body["chartData"].as_array().unwrap();
        assert_eq!(chart.len(), 5266);
        assert_eq!(chart[0]["fullDate"], "2010-01-01");
        assert_eq!(chart[5265]["fullDate"], "2024-06-01");
    }

    #[tokio::test]
    async fn test_malformed_input_reports_json_errors() {
        let app = app(Some(TOKEN), 365);

        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/watch-history",
                Some(TOKEN),
                Some(json!({ "episode_id": "abc", "watched_date": "2024-06-01" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("episode_id"));

        let not_json = Request::builder()
            .method(Method::POST)
            .uri("/watch-history")
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let (status, body) = send(&app, not_json).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &app,
            request(Method::PUT, "/watch-history/abc", Some(TOKEN), Some(json!({ "watched_date": "2024-06-05" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(&app, request(Method::GET, "/episodes?limit=many", None, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}
