//! OV2640 camera module
//!
//! Sensor bring-up over SCCB (I2C) plus frame capture through the LCD_CAM
//! peripheral. The sensor is configured for JPEG VGA with a single frame
//! buffer; each capture runs one blocking DMA transfer and returns the JPEG
//! slice bounded by the SOI/EOI markers.

use crate::{CamError, config};
use esp_hal::dma::DmaRxBuf;
use esp_hal::lcd_cam::cam::Camera;
use esp_println::println;

/// Locate the JPEG start-of-image marker (FF D8)
pub fn find_jpeg_start(buffer: &[u8], from: usize) -> Option<usize> {
    for i in from..buffer.len().saturating_sub(1) {
        if buffer[i] == 0xFF && buffer[i + 1] == 0xD8 {
            return Some(i);
        }
    }
    None
}

/// Locate the end-of-image marker (FF D9), returning the index one past it
pub fn find_jpeg_end(buffer: &[u8], from: usize) -> Option<usize> {
    for i in from..buffer.len().saturating_sub(1) {
        if buffer[i] == 0xFF && buffer[i + 1] == 0xD9 {
            return Some(i + 2);
        }
    }
    None
}

/// Bounds of one complete JPEG frame within a capture buffer
pub fn find_jpeg_range(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = find_jpeg_start(buffer, 0)?;
    let end = find_jpeg_end(buffer, start + 2)?;
    Some((start, end))
}

/// Frame source wrapping the LCD_CAM camera and its DMA buffer.
///
/// The pair moves through esp-hal's transfer API on every capture, so it is
/// held in an `Option` and taken/restored around each DMA round trip. At
/// most one frame borrow exists at a time, enforced by `&mut self`.
pub struct CameraController {
    inner: Option<(Camera<'static>, DmaRxBuf)>,
}

impl CameraController {
    pub fn new(camera: Camera<'static>, rx_buf: DmaRxBuf) -> Self {
        Self {
            inner: Some((camera, rx_buf)),
        }
    }

    /// Acquire one frame. Runs a blocking DMA transfer and returns the JPEG
    /// bytes; the borrow ends when the caller is done with the slice, which
    /// releases the buffer for the next capture.
    pub fn capture(&mut self) -> Result<&[u8], CamError> {
        let (camera, rx_buf) = self.inner.take().ok_or(CamError::CameraError)?;

        let transfer = match camera.receive(rx_buf) {
            Ok(t) => t,
            Err((e, camera, rx_buf)) => {
                println!("[CAM] Failed to start transfer: {:?}", e);
                self.inner = Some((camera, rx_buf));
                return Err(CamError::CameraError);
            }
        };

        // Blocks until the DMA transfer completes; a sensor that stops
        // clocking pixels stalls the whole capture here
        let (result, camera, rx_buf) = transfer.wait();
        self.inner = Some((camera, rx_buf));

        if let Err(e) = result {
            println!("[CAM] DMA error during frame capture: {:?}", e);
            return Err(CamError::CameraError);
        }

        let Some((_, rx_buf)) = &self.inner else {
            return Err(CamError::CameraError);
        };
        let buffer = rx_buf.as_slice();
        let (start, end) = find_jpeg_range(buffer).ok_or(CamError::CameraError)?;
        Ok(&buffer[start..end])
    }
}

fn wr<I: embedded_hal::i2c::I2c>(i2c: &mut I, reg: u8, val: u8) {
    let _ = i2c.write(config::CAMERA_I2C_ADDR, &[reg, val]);
}

/// OV2640 software reset
pub fn ov2640_reset<I: embedded_hal::i2c::I2c>(i2c: &mut I) {
    wr(i2c, 0xff, 0x01);
    wr(i2c, 0x12, 0x80);
}

/// Read the sensor PID/VER registers to confirm the OV2640 responds
pub fn ov2640_probe<I: embedded_hal::i2c::I2c>(i2c: &mut I) -> Result<(u8, u8), CamError> {
    let mut pid = [0u8; 1];
    let mut ver = [0u8; 1];
    i2c.write(config::CAMERA_I2C_ADDR, &[0xff, 0x01])
        .map_err(|_| CamError::CameraError)?;
    i2c.write_read(config::CAMERA_I2C_ADDR, &[0x0a], &mut pid)
        .map_err(|_| CamError::CameraError)?;
    i2c.write_read(config::CAMERA_I2C_ADDR, &[0x0b], &mut ver)
        .map_err(|_| CamError::CameraError)?;
    // OV2640 reports PID 0x26
    if pid[0] != 0x26 {
        return Err(CamError::CameraError);
    }
    Ok((pid[0], ver[0]))
}

/// Core sensor initialization (ESP-IDF ov2640_init register sequence)
pub fn ov2640_init<I: embedded_hal::i2c::I2c>(i2c: &mut I) {
    // Bank DSP
    wr(i2c, 0xff, 0x00);
    wr(i2c, 0x2c, 0xff);
    wr(i2c, 0x2e, 0xdf);

    // Bank sensor
    wr(i2c, 0xff, 0x01);
    wr(i2c, 0x3c, 0x32);
    wr(i2c, 0x11, 0x00); // CLKRC
    wr(i2c, 0x09, 0x02); // COM2 - output drive 2x
    wr(i2c, 0x04, 0x28); // COM1
    wr(i2c, 0x13, 0xe5); // COM8 - AGC, AWB, AEC enabled
    wr(i2c, 0x14, 0x48); // COM9
    wr(i2c, 0x2c, 0x0c);
    wr(i2c, 0x33, 0x78);
    wr(i2c, 0x3a, 0x33); // TSLB
    wr(i2c, 0x3b, 0xfb);
    wr(i2c, 0x3e, 0x00); // COM14
    wr(i2c, 0x43, 0x11);
    wr(i2c, 0x16, 0x10);
    wr(i2c, 0x39, 0x02);
    wr(i2c, 0x35, 0x88);
    wr(i2c, 0x22, 0x0a);
    wr(i2c, 0x37, 0x40);
    wr(i2c, 0x23, 0x00);
    wr(i2c, 0x34, 0xa0); // ARCOM2
    wr(i2c, 0x06, 0x02);
    wr(i2c, 0x06, 0x88);
    wr(i2c, 0x07, 0xc0);
    wr(i2c, 0x0d, 0xb7);
    wr(i2c, 0x0e, 0x01);
    wr(i2c, 0x4c, 0x00);
    wr(i2c, 0x4a, 0x81);
    wr(i2c, 0x21, 0x99);
    wr(i2c, 0x24, 0x40);
    wr(i2c, 0x25, 0x38);
    wr(i2c, 0x26, 0x82);
    wr(i2c, 0x5c, 0x00);
    wr(i2c, 0x63, 0x00);
    wr(i2c, 0x46, 0x22);
    wr(i2c, 0x0c, 0x3a);
    wr(i2c, 0x5d, 0x55);
    wr(i2c, 0x5e, 0x7d);
    wr(i2c, 0x5f, 0x7d);
    wr(i2c, 0x60, 0x55);
    wr(i2c, 0x61, 0x70);
    wr(i2c, 0x62, 0x80);
    wr(i2c, 0x7c, 0x05);
    wr(i2c, 0x20, 0x80);
    wr(i2c, 0x28, 0x30);
    wr(i2c, 0x6c, 0x00);
    wr(i2c, 0x6d, 0x80);
    wr(i2c, 0x6e, 0x00);
    wr(i2c, 0x70, 0x02);
    wr(i2c, 0x71, 0x94);
    wr(i2c, 0x73, 0xc1);
    wr(i2c, 0x3d, 0x34);
    wr(i2c, 0x12, 0x04); // COM7: JPEG mode
    wr(i2c, 0x5a, 0x57);
    wr(i2c, 0x4f, 0xbb);
    wr(i2c, 0x50, 0x9c);
}

/// Configure JPEG output at VGA (640x480) with the given compression level
pub fn ov2640_jpeg_vga<I: embedded_hal::i2c::I2c>(i2c: &mut I, quality: u8) {
    // Bank DSP - JPEG base window
    wr(i2c, 0xff, 0x00);
    wr(i2c, 0xe0, 0x04); // RESET: DVP
    wr(i2c, 0xc0, 0xc8); // HSIZE
    wr(i2c, 0xc1, 0x96); // VSIZE
    wr(i2c, 0x86, 0x3d);
    wr(i2c, 0x50, 0x89); // CTRLI
    wr(i2c, 0x51, 0x90); // HSIZE8
    wr(i2c, 0x52, 0x2c); // VSIZE8
    wr(i2c, 0x53, 0x00); // XOFFL
    wr(i2c, 0x54, 0x00); // YOFFL
    wr(i2c, 0x55, 0x88); // VHYX
    wr(i2c, 0x57, 0x00); // TEST
    wr(i2c, 0x5a, 0xa0); // ZMOW: 640/4
    wr(i2c, 0x5b, 0x78); // ZMOH: 480/4
    wr(i2c, 0x5c, 0x00); // ZMHH
    wr(i2c, 0xd3, 0x04);
    wr(i2c, 0xe0, 0x00);

    // YUV422 path feeding the JPEG encoder
    wr(i2c, 0xff, 0x00);
    wr(i2c, 0x05, 0x00);
    wr(i2c, 0xda, 0x00); // IMAGE_MODE
    wr(i2c, 0xd7, 0x03);
    wr(i2c, 0xe0, 0x00);

    // Compression level
    wr(i2c, 0xff, 0x00);
    wr(i2c, 0xe0, 0x04);
    wr(i2c, 0xdb, quality); // QS
    wr(i2c, 0xe0, 0x00);
}

/// Vertical flip, matching the board's sensor orientation
pub fn ov2640_set_vflip<I: embedded_hal::i2c::I2c>(i2c: &mut I, enable: bool) {
    wr(i2c, 0xff, 0x01);
    // REG04 base 0x28, V_FLIP | V_REF bits on top
    let reg04 = if enable { 0x28 | 0x50 } else { 0x28 };
    wr(i2c, 0x04, reg04);
}

/// Final output enable: free-running DVP timing and active capture
pub fn ov2640_enable_output<I: embedded_hal::i2c::I2c>(i2c: &mut I) {
    wr(i2c, 0xff, 0x01);
    wr(i2c, 0x09, 0x02); // COM2: output drive 2x, enable output
    wr(i2c, 0x15, 0x00); // COM10: normal HREF/VSYNC
    wr(i2c, 0x3c, 0x00); // COM12: no scaling
    wr(i2c, 0x12, 0x04); // COM7: output enable, JPEG mode

    wr(i2c, 0xff, 0x00);
    wr(i2c, 0x05, 0x00); // no test pattern
    wr(i2c, 0x44, 0x00); // enable DVP output
}
