use std::time::Duration;

use device_bridge::connectors::{ErpError, InspectionPointSource, OdooClient, OdooConfig};
use serde_json::json;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

fn client_for(server: &MockServer) -> OdooClient {
    OdooClient::new(OdooConfig {
        url: Url::parse(&format!("{}/", server.uri())).unwrap(),
        database: "bakery".to_string(),
        username: "bridge".to_string(),
        password: "secret".to_string(),
        category_id: 4,
        timeout: Duration::from_secs(2),
    })
    .unwrap()
}

async fn mount_authenticate(server: &MockServer, result: serde_json::Value, times: u64) {
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_partial_json(json!({
            "params": {
                "service": "common",
                "method": "authenticate",
                "args": ["bakery", "bridge", "secret", {}]
            }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result})),
        )
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn reads_inspection_points_of_the_configured_category() {
    let server = MockServer::start().await;
    mount_authenticate(&server, json!(7), 1).await;

    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_partial_json(json!({
            "params": {
                "service": "object",
                "method": "execute_kw",
                "args": [
                    "bakery", 7, "secret", "product.product", "search_read",
                    [[["categ_id", "=", 4]]]
                ]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": [
                {"id": 11, "name": "Flour Storage Silo A", "default_code": "ERP024_025_01", "barcode": "58-A0-CB-00-00-00-00-01", "active": true},
                {"id": 12, "name": "Loading Dock", "default_code": " ERP024_025_02 ", "barcode": false},
                {"id": 13, "name": "Unlabelled", "default_code": false, "barcode": false, "active": true}
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let points = client.inspection_points().await.unwrap();

    assert_eq!(points.len(), 2);
    assert_eq!(points[0].reference, "ERP024_025_01");
    assert_eq!(
        points[0].device_identifier.as_deref(),
        Some("58-A0-CB-00-00-00-00-01")
    );
    assert_eq!(points[1].reference, "ERP024_025_02");
    assert_eq!(points[1].device_identifier, None);
    assert!(points[1].active);

    // The session uid is reused.
    client.inspection_points().await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_are_an_authentication_failure() {
    let server = MockServer::start().await;
    mount_authenticate(&server, json!(false), 1).await;

    let err = client_for(&server).inspection_points().await.unwrap_err();
    assert_eq!(
        err,
        ErpError::AuthenticationFailed {
            username: "bridge".to_string()
        }
    );
}

#[tokio::test]
async fn rpc_fault_surfaces_the_server_message() {
    let server = MockServer::start().await;
    mount_authenticate(&server, json!(7), 1).await;

    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_partial_json(json!({"params": {"method": "execute_kw"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": {"message": "Invalid field 'categ_id'"}
            }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).inspection_points().await.unwrap_err();
    assert_eq!(
        err,
        ErpError::Fault {
            code: 200,
            message: "Invalid field 'categ_id'".to_string()
        }
    );
}

#[tokio::test]
async fn http_errors_are_reported_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client_for(&server).inspection_points().await.unwrap_err();
    assert_eq!(err, ErpError::Http { status: 502 });
}
