use deskwire::config::{Backend, Config};
use deskwire::desk_client::DeskClient;
use deskwire::error::DeskError;
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> DeskClient {
    let backend = Backend::new(server.uri(), "live-key").unwrap();
    DeskClient::new(&Config::new(backend)).unwrap()
}

fn ids(records: &[Value]) -> Vec<u64> {
    records.iter().filter_map(|r| r["id"].as_u64()).collect()
}

fn records(ids: std::ops::RangeInclusive<u64>) -> Vec<Value> {
    ids.map(|id| json!({"id": id})).collect()
}

async fn received_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn link_header_pages_are_followed_in_order() {
    let server = MockServer::start().await;
    let next = |page: u32| {
        format!(
            "<{}/api/v2/tickets?page={}>; rel=\"next\"",
            server.uri(),
            page
        )
    };

    Mock::given(method("GET"))
        .and(path("/api/v2/tickets"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next(3).as_str())
                .set_body_json(json!({"tickets": records(3..=4)})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/tickets"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tickets": records(5..=5)})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/tickets"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next(2).as_str())
                .set_body_json(json!({"tickets": records(1..=2)})),
        )
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let tickets = client
        .get_all("tickets", Some("tickets"), None)
        .await
        .unwrap();

    assert_eq!(ids(&tickets), vec![1, 2, 3, 4, 5]);
    assert_eq!(received_count(&server).await, 3);
}

#[tokio::test]
async fn total_count_pages_until_total_reached() {
    let server = MockServer::start().await;

    // 7 records spread as 3, 0, 3, 1
    let pages = [
        ("2", Vec::new()),
        ("3", records(4..=6)),
        ("4", records(7..=7)),
    ];
    for (page, items) in pages {
        Mock::given(method("GET"))
            .and(path("/api/v2/assets"))
            .and(query_param("page", page))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"assets": items, "total": 7})),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/api/v2/assets"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"assets": records(1..=3), "total": 7})),
        )
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let assets = client.get_all("assets", Some("assets"), None).await.unwrap();

    assert_eq!(assets.len(), 7);
    assert_eq!(ids(&assets), vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(received_count(&server).await, 4);
}

#[tokio::test]
async fn total_count_with_null_field_counts_as_empty_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/departments"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"departments": null, "total": 3})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/departments"))
        .and(query_param("page", "3"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"departments": records(3..=3), "total": 3})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/departments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"departments": records(1..=2), "total": 3})),
        )
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let departments = client
        .get_all("departments", Some("departments"), None)
        .await
        .unwrap();

    assert_eq!(ids(&departments), vec![1, 2, 3]);
}

#[tokio::test]
async fn single_page_without_link_or_total() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/locations"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"locations": records(1..=2)})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let locations = client
        .get_all("locations", Some("locations"), None)
        .await
        .unwrap();

    assert_eq!(ids(&locations), vec![1, 2]);
    assert_eq!(received_count(&server).await, 1);
}

#[tokio::test]
async fn single_object_field_yields_one_record() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/tickets/42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ticket": {"id": 42, "subject": "VPN"}})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let tickets = client
        .get_all("tickets/42", Some("ticket"), None)
        .await
        .unwrap();

    assert_eq!(tickets, vec![json!({"id": 42, "subject": "VPN"})]);
}

#[tokio::test]
async fn not_found_yields_empty_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/tickets/999"))
        .respond_with(ResponseTemplate::new(404).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let tickets = tokio_test::assert_ok!(client.get_all("tickets/999", Some("ticket"), None).await);
    assert!(tickets.is_empty());
}

#[tokio::test]
async fn not_found_on_later_page_ends_the_stream() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/agents"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/agents"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"agents": records(1..=2), "total": 10})),
        )
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let agents = client.get_all("agents", Some("agents"), None).await.unwrap();
    assert_eq!(ids(&agents), vec![1, 2]);
}

#[tokio::test]
async fn records_stream_lazily_page_by_page() {
    let server = MockServer::start().await;
    let link = format!("<{}/api/v2/requesters?page=2>; rel=\"next\"", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/v2/requesters"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"requesters": records(3..=4)})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/requesters"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", link.as_str())
                .set_body_json(json!({"requesters": records(1..=2)})),
        )
        .with_priority(10)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut requesters = client.get("requesters", Some("requesters"), None);

    let first = requesters.try_next().await.unwrap().unwrap();
    assert_eq!(first["id"], 1);
    let second = requesters.try_next().await.unwrap().unwrap();
    assert_eq!(second["id"], 2);
    assert_eq!(received_count(&server).await, 1);

    let third = requesters.try_next().await.unwrap().unwrap();
    assert_eq!(third["id"], 3);
    assert_eq!(received_count(&server).await, 2);

    drop(requesters);
    assert_eq!(received_count(&server).await, 2);
}

#[tokio::test]
async fn link_to_another_host_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/tickets"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", "<https://elsewhere.example.net/api/v2/tickets?page=2>; rel=\"next\"")
                .set_body_json(json!({"tickets": records(1..=1)})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.get_all("tickets", Some("tickets"), None).await;
    assert!(matches!(result, Err(DeskError::Validation(_))));
}

#[tokio::test]
async fn link_with_commas_in_query_is_followed() {
    let server = MockServer::start().await;
    let link = format!(
        "<{}/api/v2/tickets?include=requester,stats&page=2>; rel=\"next\"",
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/api/v2/tickets"))
        .and(query_param("include", "requester,stats"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tickets": records(2..=2)})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/tickets"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", link.as_str())
                .set_body_json(json!({"tickets": records(1..=1)})),
        )
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let tickets = client
        .get_all("tickets?include=requester,stats", Some("tickets"), None)
        .await
        .unwrap();

    assert_eq!(ids(&tickets), vec![1, 2]);
}
