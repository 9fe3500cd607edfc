//! Direct USB HID transport
//!
//! One I/O thread owns the device. It flushes queued outbound frames between
//! short reads, so a write never waits behind a pending read.

use super::{Channel, OpenedChannel};
use crate::error::{Error, Result};
use crate::types::{BITBOX02_PRODUCT_ID, BITBOX02_PRODUCT_NAME, BITBOX02_VENDOR_ID, HID_REPORT_SIZE};
use hidapi::{DeviceInfo, HidApi, HidDevice};
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc as std_mpsc};
use tokio::sync::mpsc;

const READ_TIMEOUT_MS: i32 = 5;

fn is_bitbox02(info: &DeviceInfo) -> bool {
    info.vendor_id() == BITBOX02_VENDOR_ID
        && info.product_id() == BITBOX02_PRODUCT_ID
        && info
            .product_string()
            .is_some_and(|name| name.contains(BITBOX02_PRODUCT_NAME))
}

fn find_device(api: &HidApi) -> Option<&DeviceInfo> {
    api.device_list().find(|info| is_bitbox02(info))
}

/// Whether a BitBox02 is plugged in and visible over HID.
pub fn is_present() -> bool {
    match HidApi::new() {
        Ok(api) => find_device(&api).is_some(),
        Err(e) => {
            debug!("HID enumeration failed: {e}");
            false
        }
    }
}

/// Pad `bytes` into report-id-prefixed HID reports.
fn reports(bytes: &[u8]) -> impl Iterator<Item = [u8; HID_REPORT_SIZE + 1]> + '_ {
    bytes.chunks(HID_REPORT_SIZE).map(|chunk| {
        let mut report = [0u8; HID_REPORT_SIZE + 1];
        report[1..=chunk.len()].copy_from_slice(chunk);
        report
    })
}

/// Blocking report I/O, as offered by [`HidDevice`].
pub(crate) trait ReportIo: Send + 'static {
    fn write_report(&mut self, report: &[u8]) -> Result<()>;
    /// Read one report, returning 0 when nothing arrived within `timeout_ms`.
    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;
}

impl ReportIo for HidDevice {
    fn write_report(&mut self, report: &[u8]) -> Result<()> {
        self.write(report)
            .map(|_| ())
            .map_err(|e| Error::ConnectionError(format!("HID write failed: {e}")))
    }

    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        self.read_timeout(buf, timeout_ms)
            .map_err(|e| Error::ConnectionError(format!("HID read failed: {e}")))
    }
}

/// Outbound half of the HID device. Frames are queued to the I/O thread.
pub struct HidChannel {
    outbound: std_mpsc::Sender<Vec<u8>>,
    open: Arc<AtomicBool>,
}

impl Channel for HidChannel {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            warn!("Write on closed HID device dropped");
            return Err(Error::NotConnected);
        }
        trace!("hid -> {}", hex::encode(bytes));
        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| Error::NotConnected)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!("Closing HID device");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Flush every queued frame. Returns false once the device is unusable or
/// every sender is gone.
fn flush(device: &mut impl ReportIo, outbound: &std_mpsc::Receiver<Vec<u8>>) -> bool {
    loop {
        match outbound.try_recv() {
            Ok(frame) => {
                for report in reports(&frame) {
                    if let Err(e) = device.write_report(&report) {
                        warn!("{e}");
                        return false;
                    }
                }
            }
            Err(std_mpsc::TryRecvError::Empty) => return true,
            Err(std_mpsc::TryRecvError::Disconnected) => return false,
        }
    }
}

/// Start the I/O thread for `device`.
pub(crate) fn spawn_io(mut device: impl ReportIo) -> OpenedChannel {
    let open = Arc::new(AtomicBool::new(true));
    let (out_tx, out_rx) = std_mpsc::channel::<Vec<u8>>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    let io_open = open.clone();
    std::thread::spawn(move || {
        let mut buf = [0u8; HID_REPORT_SIZE];
        while io_open.load(Ordering::SeqCst) {
            if !flush(&mut device, &out_rx) {
                break;
            }
            match device.read_report(&mut buf, READ_TIMEOUT_MS) {
                Ok(0) => {}
                Ok(n) => {
                    trace!("hid <- {}", hex::encode(&buf[..n]));
                    if in_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                    break;
                }
            }
        }
        io_open.store(false, Ordering::SeqCst);
        debug!("HID I/O thread stopped");
        // in_tx drops here, ending the inbound stream
    });

    OpenedChannel {
        channel: Arc::new(HidChannel {
            outbound: out_tx,
            open,
        }),
        inbound: in_rx,
    }
}

/// Open the first BitBox02 found over HID.
pub async fn open() -> Result<OpenedChannel> {
    let device = tokio::task::spawn_blocking(|| -> Result<HidDevice> {
        let api = HidApi::new()
            .map_err(|e| Error::ConnectionError(format!("Failed to initialize HID API: {e}")))?;
        let info = find_device(&api)
            .ok_or_else(|| Error::ConnectionError("No BitBox02 found".to_string()))?;
        info!("Opening BitBox02 over HID: {:?}", info.path());
        info.open_device(&api)
            .map_err(|e| Error::ConnectionError(format!("Failed to open BitBox02: {e}")))
    })
    .await
    .map_err(|e| Error::ConnectionError(format!("HID open task failed: {e}")))??;

    Ok(spawn_io(device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Device that idles for the whole read timeout and records written reports.
    #[derive(Clone, Default)]
    struct SlowDevice {
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        incoming: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_writes: bool,
    }

    impl SlowDevice {
        fn written(&self) -> Vec<Vec<u8>> {
            self.written.lock().unwrap().clone()
        }
    }

    impl ReportIo for SlowDevice {
        fn write_report(&mut self, report: &[u8]) -> Result<()> {
            if self.fail_writes {
                return Err(Error::ConnectionError("HID write failed: gone".into()));
            }
            self.written.lock().unwrap().push(report.to_vec());
            Ok(())
        }

        fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
            if let Some(report) = self.incoming.lock().unwrap().pop() {
                buf[..report.len()].copy_from_slice(&report);
                return Ok(report.len());
            }
            std::thread::sleep(Duration::from_millis(timeout_ms as u64));
            Ok(0)
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    #[test]
    fn test_reports_are_padded_and_prefixed() {
        let payload: Vec<u8> = (1..=70).collect();
        let reports: Vec<_> = reports(&payload).collect();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0][0], 0);
        assert_eq!(&reports[0][1..], &payload[..64]);
        assert_eq!(&reports[1][1..7], &payload[64..]);
        assert!(reports[1][7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_payload_sends_nothing() {
        assert_eq!(reports(&[]).count(), 0);
    }

    #[tokio::test]
    async fn test_writes_are_not_starved_by_reads() -> Result<()> {
        let device = SlowDevice::default();
        let opened = spawn_io(device.clone());

        let started = Instant::now();
        for i in 0..10u8 {
            opened.channel.write(&[i; 150])?;
        }
        assert!(wait_for(|| device.written().len() == 30).await);
        // Each frame is three reports, flushed between 5 ms reads
        assert!(started.elapsed() < Duration::from_millis(500));

        let written = device.written();
        assert_eq!(written[0][0], 0);
        assert_eq!(&written[0][1..], &[0u8; 64]);
        assert_eq!(written[29][1..23], [9u8; 22]);
        opened.channel.close();
        Ok(())
    }

    #[tokio::test]
    async fn test_inbound_reports_are_forwarded() {
        let device = SlowDevice::default();
        device.incoming.lock().unwrap().push(vec![0xab; 64]);
        let mut opened = spawn_io(device);

        let frame = tokio::time::timeout(Duration::from_secs(1), opened.inbound.recv()).await;
        assert_eq!(frame.ok().flatten(), Some(vec![0xab; 64]));
        opened.channel.close();
    }

    #[tokio::test]
    async fn test_close_stops_io_thread() {
        let mut opened = spawn_io(SlowDevice::default());
        opened.channel.close();

        assert!(matches!(opened.channel.write(&[1]), Err(Error::NotConnected)));
        let end = tokio::time::timeout(Duration::from_secs(1), opened.inbound.recv()).await;
        assert_eq!(end.ok(), Some(None));
    }

    #[tokio::test]
    async fn test_write_failure_ends_inbound_stream() -> Result<()> {
        let device = SlowDevice {
            fail_writes: true,
            ..SlowDevice::default()
        };
        let mut opened = spawn_io(device);
        opened.channel.write(&[1, 2, 3])?;

        let end = tokio::time::timeout(Duration::from_secs(1), opened.inbound.recv()).await;
        assert_eq!(end.ok(), Some(None));
        assert!(!opened.channel.is_open());
        Ok(())
    }
}
