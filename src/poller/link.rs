use std::{
    io::{self, Read, Write},
    time::{Duration, Instant},
};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

/// A blocking request/response link to the sensor
pub trait SensorLink: Send + 'static {
    /// Send `command` and read at most `max_len` bytes of reply.
    ///
    /// An empty reply means the device did not answer before the read timeout
    fn exchange(&mut self, command: &[u8], max_len: usize) -> io::Result<Vec<u8>>;
}

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    pub fn open(device: &str, baud_rate: u32, timeout: Duration) -> serialport::Result<Self> {
        let port = serialport::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;
        info!("Serial port {device} opened at {baud_rate} baud");
        Ok(Self { port })
    }
}

impl SensorLink for SerialLink {
    /// Reads until `max_len` bytes arrived or the link timeout elapsed, whichever is first.
    /// The timeout bounds the whole read, not each chunk
    fn exchange(&mut self, command: &[u8], max_len: usize) -> io::Result<Vec<u8>> {
        // drop anything left over from a reply that arrived after the last timeout
        self.port.clear(ClearBuffer::Input)?;
        self.port.write_all(command)?;
        self.port.flush()?;

        let timeout = self.port.timeout();
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; max_len];
        let mut filled = 0;
        let res = loop {
            if filled == max_len {
                break Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Ok(());
            }
            if let Err(e) = self.port.set_timeout(remaining) {
                break Err(e.into());
            }
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break Ok(()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };
        self.port.set_timeout(timeout)?;
        res?;
        buf.truncate(filled);
        Ok(buf)
    }
}
