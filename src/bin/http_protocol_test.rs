//! HTTP protocol test program
//!
//! Verifies request-line parsing, the status body layout, the exact MJPEG
//! part delimiter bytes and the JPEG marker scanners.

#![no_std]
#![no_main]

extern crate alloc;

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use cam_rs::camera::{find_jpeg_end, find_jpeg_range, find_jpeg_start};
use cam_rs::http_server::{
    Request, STREAM_PART_HEADER, render_status, response_head, write_frame, write_response,
};
use esp_hal::clock::CpuClock;
use esp_println::println;
use heapless::{String, Vec};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

/// Drive a future to completion by polling. The writer futures below are
/// always ready, so this never actually spins.
fn block_on<F: Future>(mut fut: F) -> F::Output {
    fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(core::ptr::null(), &VTABLE)
    }
    fn nop(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, nop, nop, nop);

    let waker = unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) };
    let mut cx = Context::from_waker(&waker);
    let mut fut = unsafe { Pin::new_unchecked(&mut fut) };
    loop {
        if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
            return out;
        }
    }
}

#[derive(Debug)]
struct WriteFault;

impl embedded_io_async::Error for WriteFault {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        embedded_io_async::ErrorKind::Other
    }
}

/// Test writer recording everything it accepts; writes past the budget fail
/// like a closed socket
struct RecordingWriter {
    data: Vec<u8, 1024>,
    budget: usize,
}

impl RecordingWriter {
    fn new(budget: usize) -> Self {
        Self {
            data: Vec::new(),
            budget,
        }
    }
}

impl embedded_io_async::ErrorType for RecordingWriter {
    type Error = WriteFault;
}

impl embedded_io_async::Write for RecordingWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, WriteFault> {
        if self.data.len() + buf.len() > self.budget {
            return Err(WriteFault);
        }
        self.data.extend_from_slice(buf).map_err(|_| WriteFault)?;
        Ok(buf.len())
    }
}

#[esp_hal::main]
fn main() -> ! {
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let _peripherals = esp_hal::init(hal_config);

    // Initialize heap allocator
    esp_alloc::heap_allocator!(size: 32 * 1024);

    println!("=== HTTP protocol test ===");

    println!("\n1. Request-line parsing");
    let req = Request::parse("GET /flash?action=on HTTP/1.1\r\nHost: cam\r\n\r\n").unwrap();
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/flash");
    assert_eq!(req.param("action"), Some("on"));
    assert_eq!(req.param("other"), None);

    let req = Request::parse("GET / HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(req.path, "/");
    assert_eq!(req.query, None);
    assert_eq!(req.param("action"), None);

    let req = Request::parse("POST /flash?action=on HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(req.method, "POST");

    assert!(Request::parse("").is_none());
    assert!(Request::parse("GET").is_none());
    println!("✅ Method, path and query parse correctly");

    println!("\n2. Multi-parameter query");
    let req = Request::parse("GET /flash?foo=1&action=auto HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(req.param("action"), Some("auto"));
    assert_eq!(req.param("foo"), Some("1"));

    // A value-less pair must not end the scan early
    let req = Request::parse("GET /flash?x&action=on HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(req.param("action"), Some("on"));
    assert_eq!(req.param("x"), None);
    println!("✅ Parameter lookup scans all pairs, skipping malformed ones");

    println!("\n3. Status body layout");
    let mut body = String::<256>::new();
    render_status(&mut body, Some([192, 168, 1, 42]), true, true, "AUTO", 321, 45678).unwrap();
    assert_eq!(body.lines().count(), 6);
    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("IP: 192.168.1.42"));
    assert_eq!(lines.next(), Some("Camera: ready"));
    assert_eq!(lines.next(), Some("Flash: ON"));
    assert_eq!(lines.next(), Some("Mode: AUTO"));
    assert_eq!(lines.next(), Some("Light: 321"));
    assert_eq!(lines.next(), Some("Free heap: 45678 bytes"));

    let mut body = String::<256>::new();
    render_status(&mut body, None, false, false, "MANUEL", 0, 0).unwrap();
    assert_eq!(body.lines().count(), 6);
    assert!(body.as_str().contains("IP: unassigned"));
    assert!(body.as_str().contains("Camera: offline"));
    assert!(body.as_str().contains("Flash: OFF"));
    assert!(body.as_str().contains("Mode: MANUEL"));
    println!("✅ Exactly one line per field");

    println!("\n4. Stream part delimiter bytes");
    assert_eq!(
        STREAM_PART_HEADER,
        b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_slice()
    );
    println!("✅ Part header matches the multipart boundary contract");

    println!("\n5. JPEG marker scanning");
    let mut frame = [0u8; 64];
    frame[4] = 0xFF;
    frame[5] = 0xD8;
    frame[20] = 0xFF;
    frame[21] = 0xD9;
    assert_eq!(find_jpeg_start(&frame, 0), Some(4));
    assert_eq!(find_jpeg_end(&frame, 6), Some(22));
    assert_eq!(find_jpeg_range(&frame), Some((4, 22)));
    let slice = &frame[4..22];
    assert_eq!(slice[..2], [0xFF, 0xD8]);
    assert_eq!(slice[slice.len() - 2..], [0xFF, 0xD9]);

    // No end marker: the frame is incomplete and must be rejected
    let mut truncated = [0u8; 16];
    truncated[0] = 0xFF;
    truncated[1] = 0xD8;
    assert_eq!(find_jpeg_range(&truncated), None);

    // All zeroes: no frame at all
    assert_eq!(find_jpeg_range(&[0u8; 16]), None);
    println!("✅ SOI/EOI bounds locate the encoded frame");

    println!("\n6. Response writing");
    let mut expected_head = String::<256>::new();
    response_head(
        &mut expected_head,
        "HTTP/1.1 500 Internal Server Error\r\n",
        "text/plain",
        0,
    )
    .unwrap();
    assert!(expected_head.as_str().contains("Content-Length: 0\r\n"));

    // A failed snapshot answers with the head alone, zero body bytes
    let mut writer = RecordingWriter::new(1024);
    block_on(write_response(
        &mut writer,
        "HTTP/1.1 500 Internal Server Error\r\n",
        "text/plain",
        b"",
    ))
    .unwrap();
    assert_eq!(writer.data.as_slice(), expected_head.as_bytes());

    let mut writer = RecordingWriter::new(1024);
    block_on(write_response(
        &mut writer,
        "HTTP/1.1 200 OK\r\n",
        "text/plain",
        b"Flash ON",
    ))
    .unwrap();
    assert!(writer.data.ends_with(b"\r\n\r\nFlash ON"));
    assert!(
        core::str::from_utf8(&writer.data)
            .unwrap()
            .contains("Content-Length: 8\r\n")
    );
    println!("✅ Empty bodies write the head alone");

    println!("\n7. Stream part writing stops at a dead peer");
    let frame = [0xFFu8, 0xD8, 0x00, 0x11, 0xFF, 0xD9];
    let mut writer = RecordingWriter::new(1024);
    block_on(write_frame(&mut writer, &frame)).unwrap();
    let mut expected = Vec::<u8, 128>::new();
    expected.extend_from_slice(STREAM_PART_HEADER).unwrap();
    expected.extend_from_slice(&frame).unwrap();
    expected.extend_from_slice(b"\r\n").unwrap();
    assert_eq!(writer.data.as_slice(), expected.as_slice());

    // Peer gone after the part delimiter: the frame write fails and the
    // trailing CRLF is never attempted
    let mut writer = RecordingWriter::new(STREAM_PART_HEADER.len());
    assert!(block_on(write_frame(&mut writer, &frame)).is_err());
    assert_eq!(writer.data.as_slice(), STREAM_PART_HEADER);
    println!("✅ No writes are attempted after a failed one");

    println!("\n=== All tests passed! ===");

    loop {
        for _ in 0..1000000 {
            unsafe {
                core::ptr::read_volatile(&0u32);
            }
        }
    }
}
