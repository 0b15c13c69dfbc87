//! HTTP 控制 API 测试 - 用本地 TcpListener 模拟服务端

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use frame_writer_client::{
    ControlApi, Endpoints, HttpControlApi, ProbeError, RemotePhase, ServiceProbe,
};

/// 启动一个只应答 `count` 次的服务端，返回 `http://127.0.0.1:<port>`
fn serve(count: usize, status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        for stream in listener.incoming().take(count) {
            let mut stream = stream.unwrap();
            let mut buf = [0u8; 4096];
            let mut request = Vec::new();
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    format!("http://127.0.0.1:{}", port)
}

fn api(control: &str, writer: &str) -> HttpControlApi {
    HttpControlApi::new(
        Endpoints {
            control_api_address: control.to_string(),
            writer_api_address: writer.to_string(),
            service_name: "pco_writer-pco1".to_string(),
        },
        Duration::from_millis(500),
    )
    .unwrap()
}

// ============================================================================
// 传输层失败
// ============================================================================

mod failure_tests {
    use super::*;

    #[test]
    fn test_unreachable_control_api() {
        let api = api("http://127.0.0.1:1", "http://127.0.0.1:1");
        let err = api.ack().unwrap_err();
        assert!(matches!(err, ProbeError::Unreachable { .. }));
        assert!(!ServiceProbe::is_connected(&api));
    }

    #[test]
    fn test_unreachable_writer_means_no_statistics() {
        let api = api("http://127.0.0.1:1", "http://127.0.0.1:1");
        assert_eq!(api.statistics().unwrap(), None);
    }

    #[test]
    fn test_non_json_body_is_malformed() {
        let url = serve(1, "200 OK", "<html>maintenance</html>");
        let api = api(&url, &url);
        let err = api.status().unwrap_err();
        match err {
            ProbeError::Malformed { reason, .. } => assert!(reason.contains("maintenance")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_http_error_status() {
        let url = serve(1, "500 Internal Server Error", "{}");
        let api = api(&url, &url);
        let err = api.last_run_statistics().unwrap_err();
        assert!(matches!(err, ProbeError::Http { status: 500, .. }));
        assert!(!err.is_unreachable());
    }
}

// ============================================================================
// 正常应答
// ============================================================================

mod response_tests {
    use super::*;

    #[test]
    fn test_status_is_parsed() {
        let url = serve(1, "200 OK", r#"{"success": true, "status": "writing"}"#);
        let api = api(&url, &url);
        assert_eq!(api.status().unwrap(), RemotePhase::Writing);
    }

    #[test]
    fn test_ack() {
        let url = serve(1, "200 OK", r#"{"success": true}"#);
        assert!(ServiceProbe::is_connected(&api(&url, &url)));
    }

    #[test]
    fn test_statistics_with_string_numbers() {
        let url = serve(
            1,
            "200 OK",
            r#"{"n_written_frames": "250", "n_frames": "1000", "status": "writing"}"#,
        );
        let stats = api(&url, &url).statistics().unwrap().unwrap();
        assert_eq!(stats.n_written_frames, Some(250));
        assert_eq!(stats.n_frames, Some(1000));
    }

    #[test]
    fn test_kill_reports_status() {
        let url = serve(1, "200 OK", r#"{"success": true, "status": "killed"}"#);
        assert_eq!(api(&url, &url).kill().unwrap(), RemotePhase::Killed);
    }

    #[test]
    fn test_stop_refusal_is_decoded() {
        let url = serve(1, "200 OK", r#"{"success": false, "value": "writer not running"}"#);
        let response = api(&url, &url).stop().unwrap();
        assert!(!response.success);
        assert_eq!(response.reason(), "writer not running");
    }

    #[test]
    fn test_empty_error_is_none() {
        let url = serve(1, "200 OK", r#"{"success": true, "error": ""}"#);
        assert_eq!(api(&url, &url).error().unwrap(), None);
    }
}
