//! HTTP server module
//!
//! Hand-rolled GET-only server on the embassy-net TCP socket: root control
//! page, MJPEG stream, single-frame snapshot, flash control and a plain-text
//! status endpoint. One client is served at a time.

use core::fmt::Write as _;
use core::str::from_utf8;

use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use esp_println::println;
use heapless::String;

use crate::camera::CameraController;
use crate::config;
use crate::flash::{FlashController, FlashMode};

/// Flash controller shared between the HTTP and sensing tasks
pub type SharedFlash = Mutex<CriticalSectionRawMutex, FlashController>;

/// MJPEG part delimiter written before every frame
pub const STREAM_PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// Response head announcing the multipart stream
pub const STREAM_RESPONSE_HEADER: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n";

const ROOT_PAGE: &[u8] = b"<html>\
<head>\
  <title>cam-rs</title>\
  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
  <style>\
    body { font-family: Arial; margin: 20px; background: #f0f0f0; }\
    .container { max-width: 800px; margin: 0 auto; background: white; padding: 20px; border-radius: 10px; }\
    .stream-container { text-align: center; margin: 20px 0; }\
    img { max-width: 100%; border: 2px solid #333; border-radius: 5px; }\
    .controls { display: flex; gap: 10px; margin: 20px 0; flex-wrap: wrap; }\
    .button { padding: 10px 20px; background: #007bff; color: white; text-decoration: none; border-radius: 5px; }\
  </style>\
</head>\
<body>\
  <div class=\"container\">\
    <h1>cam-rs</h1>\
    <div class=\"stream-container\">\
      <img src=\"/stream\" alt=\"Live Stream\">\
    </div>\
    <div class=\"controls\">\
      <a class=\"button\" href=\"/stream\">Stream</a>\
      <a class=\"button\" href=\"/snapshot\">Snapshot</a>\
      <a class=\"button\" href=\"/flash?action=on\">Flash ON</a>\
      <a class=\"button\" href=\"/flash?action=off\">Flash OFF</a>\
      <a class=\"button\" href=\"/flash?action=auto\">Flash AUTO</a>\
      <a class=\"button\" href=\"/status\">Status</a>\
    </div>\
  </div>\
</body>\
</html>";

/// One parsed GET request line
#[derive(Debug, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
}

impl<'a> Request<'a> {
    /// Parse the request line out of a raw request. Headers and body are
    /// ignored; routing only needs method, path and query string.
    pub fn parse(text: &'a str) -> Option<Self> {
        let request_line = text.lines().next()?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?;
        let target = parts.next()?;

        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (target, None),
        };

        Some(Self {
            method,
            path,
            query,
        })
    }

    /// Look up one query parameter by name. Pairs without an `=` are
    /// skipped, not treated as the end of the query string.
    pub fn param(&self, name: &str) -> Option<&'a str> {
        let query = self.query?;
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if key == name {
                return Some(value);
            }
        }
        None
    }
}

/// Render the status body: exactly one line per field
pub fn render_status(
    out: &mut String<256>,
    ip: Option<[u8; 4]>,
    camera_ready: bool,
    flash_on: bool,
    mode_label: &str,
    light_level: u16,
    free_heap: usize,
) -> core::fmt::Result {
    match ip {
        Some(ip) => writeln!(out, "IP: {}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])?,
        None => writeln!(out, "IP: unassigned")?,
    }
    writeln!(out, "Camera: {}", if camera_ready { "ready" } else { "offline" })?;
    writeln!(out, "Flash: {}", if flash_on { "ON" } else { "OFF" })?;
    writeln!(out, "Mode: {}", mode_label)?;
    writeln!(out, "Light: {}", light_level)?;
    writeln!(out, "Free heap: {} bytes", free_heap)?;
    Ok(())
}

/// Build a fixed-length response head
pub fn response_head(
    out: &mut String<256>,
    status_line: &str,
    content_type: &str,
    content_length: usize,
) -> core::fmt::Result {
    out.push_str(status_line)?;
    write!(out, "Content-Type: {}\r\n", content_type)?;
    write!(out, "Content-Length: {}\r\n", content_length)?;
    out.push_str("Connection: close\r\n\r\n")?;
    Ok(())
}

/// Write a complete response: the fixed-length head, then the body. An
/// empty body writes the head alone; no zero-length body write is issued.
pub async fn write_response<W: Write>(
    writer: &mut W,
    status_line: &str,
    content_type: &str,
    body: &[u8],
) -> Result<(), W::Error> {
    let mut head = String::<256>::new();
    if response_head(&mut head, status_line, content_type, body.len()).is_err() {
        println!("[HTTP] Response head overflow");
        return Ok(());
    }

    writer.write_all(head.as_bytes()).await?;
    if !body.is_empty() {
        writer.write_all(body).await?;
    }
    Ok(())
}

/// Write one MJPEG part: delimiter, frame bytes, trailing CRLF. The first
/// failed write aborts the part; no later bytes are attempted.
pub async fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<(), W::Error> {
    writer.write_all(STREAM_PART_HEADER).await?;
    writer.write_all(frame).await?;
    writer.write_all(b"\r\n").await
}

async fn send_plain(
    socket: &mut TcpSocket<'_>,
    status_line: &str,
    content_type: &str,
    body: &[u8],
) {
    if let Err(e) = write_response(socket, status_line, content_type, body).await {
        println!("[HTTP] Failed to write response: {:?}", e);
        socket.abort();
    }
}

/// Stream frames until the peer goes away. An empty capture is logged and
/// retried on the very next iteration; only a failed socket write (the
/// transport's view of a disconnect) ends the loop.
async fn handle_stream(socket: &mut TcpSocket<'_>, camera: &mut Option<CameraController>) {
    let Some(camera) = camera.as_mut() else {
        send_plain(
            socket,
            "HTTP/1.1 500 Internal Server Error\r\n",
            "text/plain",
            b"",
        )
        .await;
        return;
    };

    if let Err(e) = socket.write_all(STREAM_RESPONSE_HEADER).await {
        println!("[HTTP] Failed to start stream: {:?}", e);
        socket.abort();
        return;
    }

    println!("[HTTP] Stream started");

    loop {
        let frame = match camera.capture() {
            Ok(frame) => frame,
            Err(_) => {
                println!("[HTTP] Empty frame, retrying");
                // Zero-length sleep: the retry stays immediate but the
                // executor gets to run the other tasks in between
                Timer::after_millis(0).await;
                continue;
            }
        };

        if write_frame(socket, frame).await.is_err() {
            println!("[HTTP] Stream client disconnected");
            break;
        }

        Timer::after_millis(config::STREAM_FRAME_DELAY_MS).await;
    }
}

/// One frame as an image/jpeg response, 500 with no body on capture failure
async fn handle_snapshot(socket: &mut TcpSocket<'_>, camera: &mut Option<CameraController>) {
    let frame = match camera.as_mut().map(|c| c.capture()) {
        Some(Ok(frame)) => frame,
        _ => {
            println!("[HTTP] Snapshot capture failed");
            send_plain(
                socket,
                "HTTP/1.1 500 Internal Server Error\r\n",
                "text/plain",
                b"",
            )
            .await;
            return;
        }
    };

    send_plain(socket, "HTTP/1.1 200 OK\r\n", "image/jpeg", frame).await;
    println!("[HTTP] Snapshot sent ({} bytes)", frame.len());
}

async fn handle_flash(
    socket: &mut TcpSocket<'_>,
    flash: &'static SharedFlash,
    action: Option<&str>,
) {
    let mode = action.and_then(FlashMode::parse);

    let (status_line, body): (&str, &[u8]) = match mode {
        Some(mode) => {
            flash.lock().await.set_mode(mode);
            let body: &[u8] = match mode {
                FlashMode::ForcedOn => b"Flash ON",
                FlashMode::ForcedOff => b"Flash OFF",
                FlashMode::Auto => b"Flash AUTO",
            };
            ("HTTP/1.1 200 OK\r\n", body)
        }
        None => (
            "HTTP/1.1 400 Bad Request\r\n",
            b"Invalid action: on/off/auto".as_slice(),
        ),
    };

    send_plain(socket, status_line, "text/plain", body).await;
}

async fn handle_status(
    socket: &mut TcpSocket<'_>,
    stack: Stack<'_>,
    flash: &'static SharedFlash,
    camera_ready: bool,
) {
    let ip = stack.config_v4().map(|cfg| cfg.address.address().octets());
    let (flash_on, mode_label, light_level) = {
        let flash = flash.lock().await;
        (flash.is_on(), flash.mode().status_label(), flash.light_level())
    };

    let mut body = String::<256>::new();
    if render_status(
        &mut body,
        ip,
        camera_ready,
        flash_on,
        mode_label,
        light_level,
        esp_alloc::HEAP.free(),
    )
    .is_err()
    {
        println!("[HTTP] Status body overflow");
        socket.abort();
        return;
    }

    send_plain(socket, "HTTP/1.1 200 OK\r\n", "text/plain", body.as_bytes()).await;
}

/// Accept loop. Serves one connection at a time; the camera lives in this
/// task, so at most one frame is outstanding at any moment.
pub async fn serve(
    stack: Stack<'static>,
    mut camera: Option<CameraController>,
    flash: &'static SharedFlash,
) -> ! {
    let camera_ready = camera.is_some();
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 4096];
    let mut request = [0u8; 1024];

    println!("[HTTP] Server listening on port {}", config::HTTP_PORT);

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(30)));

        if let Err(e) = socket.accept(config::HTTP_PORT).await {
            println!("[HTTP] Accept error: {:?}", e);
            Timer::after_millis(500).await;
            continue;
        }

        let request_len = match socket.read(&mut request).await {
            Ok(0) => {
                let _ = socket.flush().await;
                socket.close();
                continue;
            }
            Ok(n) => n,
            Err(e) => {
                println!("[HTTP] Read error: {:?}", e);
                let _ = socket.flush().await;
                socket.close();
                continue;
            }
        };

        let request_text = from_utf8(&request[..request_len]).unwrap_or("");
        let Some(req) = Request::parse(request_text) else {
            send_plain(
                &mut socket,
                "HTTP/1.1 400 Bad Request\r\n",
                "text/plain",
                b"Bad Request",
            )
            .await;
            let _ = socket.flush().await;
            socket.close();
            continue;
        };

        if req.method != "GET" {
            send_plain(
                &mut socket,
                "HTTP/1.1 405 Method Not Allowed\r\n",
                "text/plain",
                b"Method Not Allowed",
            )
            .await;
            let _ = socket.flush().await;
            socket.close();
            continue;
        }

        match req.path {
            "/" => {
                send_plain(&mut socket, "HTTP/1.1 200 OK\r\n", "text/html", ROOT_PAGE).await;
            }
            "/stream" => {
                handle_stream(&mut socket, &mut camera).await;
            }
            "/snapshot" => {
                handle_snapshot(&mut socket, &mut camera).await;
            }
            "/flash" => {
                handle_flash(&mut socket, flash, req.param("action")).await;
            }
            "/status" => {
                handle_status(&mut socket, stack, flash, camera_ready).await;
            }
            _ => {
                send_plain(
                    &mut socket,
                    "HTTP/1.1 404 Not Found\r\n",
                    "text/plain",
                    b"Not Found",
                )
                .await;
            }
        }

        let _ = socket.flush().await;
        socket.close();
    }
}
