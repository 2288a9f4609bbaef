use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use guardian_lens::dispatch::AudioCommandSink;
use guardian_lens::{Dispatcher, EventIdentity, EventSink, FallEvent};

fn event() -> FallEvent {
    FallEvent::confirm(&EventIdentity::new("gd001", "Sangenjaya, Tokyo"))
}

struct CapturedRequest {
    head: String,
    body: String,
}

/// Serve exactly one HTTP request on loopback, answering with `status`.
fn one_shot_server(status: &'static str) -> (String, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let url = format!("http://{}/dev", listener.local_addr().expect("local addr"));
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut head = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read header");
            if line == "\r\n" || line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("content length");
                }
            }
            head.push_str(&line);
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).expect("read body");

        let mut stream = stream;
        let reply = format!(
            "HTTP/1.1 {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
            status
        );
        stream.write_all(reply.as_bytes()).expect("write response");
        let _ = tx.send(CapturedRequest {
            head,
            body: String::from_utf8(body).expect("utf-8 body"),
        });
    });

    (url, rx)
}

#[cfg(feature = "notify-http")]
#[test]
fn notify_sink_posts_json_record() {
    use guardian_lens::dispatch::HttpNotifySink;

    let (url, rx) = one_shot_server("200 OK");
    let sink = HttpNotifySink::new(url, Duration::from_secs(5));
    let ev = event();
    sink.deliver(&ev).expect("delivered");

    let request = rx.recv_timeout(Duration::from_secs(5)).expect("request");
    assert!(request.head.starts_with("POST /dev "));
    assert!(request
        .head
        .to_ascii_lowercase()
        .contains("content-type: application/json"));

    let payload: serde_json::Value = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(payload["event_id"], ev.event_id());
    assert_eq!(payload["event"], "Fall_Detected");
    assert_eq!(payload["device_id"], "gd001");
    assert_eq!(payload["timestamp"], ev.timestamp());
    assert_eq!(payload["location"], "Sangenjaya, Tokyo");
}

#[cfg(feature = "notify-http")]
#[test]
fn notify_sink_reports_server_errors() {
    use guardian_lens::dispatch::HttpNotifySink;

    let (url, _rx) = one_shot_server("500 Internal Server Error");
    let dispatcher = Dispatcher::new().with_sink(HttpNotifySink::new(url, Duration::from_secs(5)));
    let report = dispatcher.submit(event()).join();
    assert!(report.delivered.is_empty());
    assert_eq!(report.failed, vec!["notify"]);
}

#[cfg(feature = "notify-http")]
#[test]
fn notify_sink_reports_unreachable_endpoint() {
    use guardian_lens::dispatch::HttpNotifySink;

    // Bind then drop to get a port with nothing listening.
    let port = TcpListener::bind("127.0.0.1:0")
        .expect("bind loopback")
        .local_addr()
        .expect("local addr")
        .port();
    let sink = HttpNotifySink::new(
        format!("http://127.0.0.1:{}/dev", port),
        Duration::from_secs(2),
    );
    assert!(sink.deliver(&event()).is_err());
}

#[cfg(unix)]
#[test]
fn audio_sink_exports_only_the_event_id() {
    let dir = tempfile::tempdir().expect("temp dir");
    let out = dir.path().join("event_id.txt");
    let command = vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("printf '%s' \"$EVENT_ID\" > '{}'", out.display()),
    ];
    let sink = AudioCommandSink::new(&command, "EVENT_ID").expect("audio sink");

    let ev = event();
    sink.deliver(&ev).expect("audio command ran");
    let written = std::fs::read_to_string(&out).expect("read output");
    assert_eq!(written, ev.event_id());
}

#[cfg(unix)]
#[test]
fn audio_failure_does_not_block_other_sinks() {
    let failing = AudioCommandSink::new(&["false".to_string()], "EVENT_ID").expect("audio sink");
    let missing = AudioCommandSink::new(
        &["/nonexistent/guardian-audio".to_string()],
        "EVENT_ID",
    )
    .expect("audio sink");
    let ok = AudioCommandSink::new(&["true".to_string()], "EVENT_ID").expect("audio sink");

    let report = Dispatcher::new()
        .with_sink(failing)
        .with_sink(missing)
        .with_sink(ok)
        .submit(event())
        .join();
    assert_eq!(report.delivered, vec!["audio"]);
    assert_eq!(report.failed, vec!["audio", "audio"]);
}
