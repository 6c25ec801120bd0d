//! # Logging
//! src/logging.rs
//!
//! Subscriber de `tracing` con salida opcionalmente asíncrona: cada evento
//! se formatea en el thread que lo emite y se encola en un canal acotado;
//! un thread escritor lo vacía hacia stdout. Si la cola está llena el
//! productor espera.

use crate::config::Config;
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;

enum LogMsg {
    Line(Vec<u8>),
    Flush(SyncSender<()>),
    Shutdown,
}

/// Instala el subscriber global según la configuración
///
/// # Retorna
///
/// - `Ok(None)` si el log está desactivado o es síncrono
/// - `Ok(Some(guard))` con log asíncrono; soltar el guard vacía la cola
///
/// # Errores
///
/// Si ya había un subscriber global instalado.
pub fn init(config: &Config) -> Result<Option<LogGuard>, String> {
    if !config.open_log {
        return Ok(None);
    }

    let level = level_filter(config.log_level);
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(true);

    if config.log_queue_size == 0 {
        builder
            .with_writer(io::stdout)
            .try_init()
            .map_err(|e| format!("failed to install logger: {}", e))?;
        return Ok(None);
    }

    let (writer, guard) = AsyncLog::start(config.log_queue_size, io::stdout())
        .map_err(|e| format!("failed to start log writer: {}", e))?;
    builder
        .with_writer(writer)
        .try_init()
        .map_err(|e| format!("failed to install logger: {}", e))?;
    Ok(Some(guard))
}

/// Nivel numérico de la configuración → filtro de tracing
pub fn level_filter(level: u8) -> LevelFilter {
    match level {
        0 => LevelFilter::DEBUG,
        1 => LevelFilter::INFO,
        2 => LevelFilter::WARN,
        _ => LevelFilter::ERROR,
    }
}

/// Cola de log con thread escritor dedicado
pub struct AsyncLog;

impl AsyncLog {
    /// Arranca el thread escritor sobre `sink`
    pub fn start<W>(capacity: usize, sink: W) -> io::Result<(QueueMakeWriter, LogGuard)>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let handle = thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || writer_loop(rx, sink))?;

        Ok((
            QueueMakeWriter { tx: tx.clone() },
            LogGuard {
                tx,
                handle: Some(handle),
            },
        ))
    }
}

fn writer_loop<W: Write>(rx: Receiver<LogMsg>, mut sink: W) {
    while let Ok(msg) = rx.recv() {
        match msg {
            LogMsg::Line(line) => {
                let _ = sink.write_all(&line);
            }
            LogMsg::Flush(ack) => {
                let _ = sink.flush();
                let _ = ack.send(());
            }
            LogMsg::Shutdown => break,
        }
    }
    // Lo que quedó encolado después del shutdown
    while let Ok(LogMsg::Line(line)) = rx.try_recv() {
        let _ = sink.write_all(&line);
    }
    let _ = sink.flush();
}

/// `MakeWriter` que encola cada evento formateado
#[derive(Clone)]
pub struct QueueMakeWriter {
    tx: SyncSender<LogMsg>,
}

impl<'a> MakeWriter<'a> for QueueMakeWriter {
    type Writer = QueueWriter;

    fn make_writer(&'a self) -> Self::Writer {
        QueueWriter {
            tx: self.tx.clone(),
            buf: Vec::with_capacity(128),
        }
    }
}

/// Acumula un evento y lo encola al soltarse
pub struct QueueWriter {
    tx: SyncSender<LogMsg>,
    buf: Vec<u8>,
}

impl Write for QueueWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for QueueWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.buf);
        // Escritor ya cerrado: escribir directo
        if let Err(mpsc::SendError(LogMsg::Line(line))) = self.tx.send(LogMsg::Line(line)) {
            let _ = io::stderr().write_all(&line);
        }
    }
}

/// Mantiene vivo el thread escritor; al soltarse vacía la cola y lo espera
pub struct LogGuard {
    tx: SyncSender<LogMsg>,
    handle: Option<JoinHandle<()>>,
}

impl LogGuard {
    /// Bloquea hasta que todo lo encolado antes de esta llamada esté escrito
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if self.tx.send(LogMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
