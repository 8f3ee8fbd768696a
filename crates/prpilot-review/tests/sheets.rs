use mockito::{Matcher, Server};
use prpilot_core::{ApprovalSummary, PrState, Review, ReviewState, SheetsConfig};
use prpilot_review::collaborators::TrackingSheet;
use prpilot_review::sheets::SheetsClient;
use prpilot_review::testing::pull_request;
use serde_json::json;

const VALUES: &str = "/v4/spreadsheets/sheet123/values";

fn client(server: &Server) -> SheetsClient {
    let config = SheetsConfig {
        access_token: Some("ya29.token".into()),
        spreadsheet_id: Some("sheet123".into()),
        worksheet_name: "Tracking".into(),
        api_url: server.url(),
        ..SheetsConfig::default()
    };
    SheetsClient::new(&config).unwrap()
}

fn column_a(numbers: &[&str]) -> String {
    let values: Vec<Vec<&str>> = numbers.iter().map(|n| vec![*n]).collect();
    json!({ "range": "Tracking!A1:A10", "values": values }).to_string()
}

#[tokio::test]
async fn setup_writes_header_row() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", format!("{VALUES}/Tracking!A1:H1").as_str())
        .match_query(Matcher::UrlEncoded("valueInputOption".into(), "RAW".into()))
        .match_header("authorization", "Bearer ya29.token")
        .match_body(Matcher::PartialJson(json!({
            "values": [["PR Number", "Title", "Status", "Created Date", "Review Status", "Approvals", "Comments Count", "Last Updated"]]
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    client(&server).setup().await.unwrap();
    mock.assert_async().await;
}

fn append_mock(server: &mut Server) -> mockito::Mock {
    server
        .mock("POST", format!("{VALUES}/Tracking!A:H:append").as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("valueInputOption".into(), "RAW".into()),
            Matcher::UrlEncoded("insertDataOption".into(), "INSERT_ROWS".into()),
        ]))
        .match_header("authorization", "Bearer ya29.token")
        .match_body(Matcher::Regex(r#""pending","0/1",0"#.into()))
        .with_status(200)
        .with_body(r#"{"updates":{"updatedRange":"Tracking!A4:H4","updatedRows":1}}"#)
}

#[tokio::test]
async fn add_row_appends_without_reading_the_sheet() {
    let mut server = Server::new_async().await;
    let read = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let overwrite = server
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let append = append_mock(&mut server).create_async().await;

    client(&server)
        .add_row(&pull_request(3, PrState::Open))
        .await
        .unwrap();
    append.assert_async().await;
    read.assert_async().await;
    overwrite.assert_async().await;
}

#[tokio::test]
async fn concurrent_add_rows_are_both_appended() {
    let mut server = Server::new_async().await;
    let first = append_mock(&mut server)
        .match_body(Matcher::Regex(r#"^\{.*"values":\[\[10,"#.into()))
        .create_async()
        .await;
    let second = append_mock(&mut server)
        .match_body(Matcher::Regex(r#"^\{.*"values":\[\[11,"#.into()))
        .create_async()
        .await;

    let sheet = client(&server);
    let pr10 = pull_request(10, PrState::Open);
    let pr11 = pull_request(11, PrState::Open);
    let (a, b) = tokio::join!(sheet.add_row(&pr10), sheet.add_row(&pr11));
    a.unwrap();
    b.unwrap();

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn find_row_is_one_based() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", format!("{VALUES}/Tracking!A:A").as_str())
        .with_status(200)
        .with_body(column_a(&["PR Number", "10", "11"]))
        .create_async()
        .await;

    let sheet = client(&server);
    assert_eq!(sheet.find_row(11).await.unwrap(), Some(3));
    assert_eq!(sheet.find_row(99).await.unwrap(), None);
}

#[tokio::test]
async fn update_approvals_writes_status_and_cell() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", format!("{VALUES}/Tracking!A:A").as_str())
        .with_status(200)
        .with_body(column_a(&["PR Number", "5"]))
        .create_async()
        .await;
    let status = server
        .mock("PUT", format!("{VALUES}/Tracking!C2").as_str())
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJson(json!({ "values": [["merged"]] })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let approvals = server
        .mock("PUT", format!("{VALUES}/Tracking!F2").as_str())
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJson(json!({ "values": [["1/1 \u{2705}"]] })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let stamp = server
        .mock("PUT", format!("{VALUES}/Tracking!H2").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let reviews = vec![Review {
        id: 1,
        user: "bob".into(),
        body: String::new(),
        state: ReviewState::Approved,
        submitted_at: None,
        commit_id: None,
    }];
    let summary = ApprovalSummary::reconcile(PrState::Merged, &reviews, 1);
    let updated = client(&server)
        .update_approvals(5, &summary, PrState::Merged)
        .await
        .unwrap();

    assert!(updated);
    status.assert_async().await;
    approvals.assert_async().await;
    stamp.assert_async().await;
}

#[tokio::test]
async fn update_review_status_without_row_writes_nothing() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", format!("{VALUES}/Tracking!A:A").as_str())
        .with_status(200)
        .with_body(r#"{"range":"Tracking!A1:A1"}"#)
        .create_async()
        .await;
    let writes = server
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let updated = client(&server)
        .update_review_status(5, "reviewed", 2)
        .await
        .unwrap();
    assert!(!updated);
    writes.assert_async().await;
}

#[tokio::test]
async fn rows_skip_header() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", format!("{VALUES}/Tracking!A:H").as_str())
        .with_status(200)
        .with_body(
            json!({
                "values": [
                    ["PR Number", "Title", "Status", "Created Date", "Review Status", "Approvals", "Comments Count", "Last Updated"],
                    ["1", "First", "open", "2025-01-01", "pending", "0/1", "0", "2025-01-01"],
                    ["2", "Second", "closed", "2025-01-02", "reviewed", "1/1 \u{2705}", "4", "2025-01-03"]
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let rows = client(&server).rows().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].comments_count, 4);
    assert_eq!(rows[1].approvals, "1/1 \u{2705}");
}

#[tokio::test]
async fn clear_targets_data_rows() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", format!("{VALUES}/Tracking!A2:H:clear").as_str())
        .with_status(200)
        .with_body(r#"{"clearedRange":"Tracking!A2:H100"}"#)
        .create_async()
        .await;

    client(&server).clear().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_reports_failure_as_false() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", format!("{VALUES}/Tracking!A1").as_str())
        .with_status(403)
        .with_body(r#"{"error":{"code":403,"message":"The caller does not have permission"}}"#)
        .create_async()
        .await;

    assert!(!client(&server).test_connection().await);
}
