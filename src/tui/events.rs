use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;

/// Input-side events for the UI loop. The tick is not an event here: the
/// run loop owns the tick timer so its cadence can adapt between ticks.
#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    Resize(u16, u16),
    Shutdown,
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    handler: Option<tokio::task::JoinHandle<()>>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let handler = tokio::spawn(async move {
            let mut reader = EventStream::new();

            // SIGINT maps to the same shutdown path as 'q'; if the handler
            // can't be installed the key bindings still work.
            #[cfg(unix)]
            let mut sigint =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
                    Ok(s) => Some(s),
                    Err(e) => {
                        tracing::warn!("failed to create SIGINT handler: {}. Use 'q' to quit.", e);
                        None
                    }
                };

            loop {
                let crossterm_event = reader.next().fuse();

                #[cfg(unix)]
                let sigint_recv = async {
                    match sigint.as_mut() {
                        Some(s) => {
                            s.recv().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                #[cfg(not(unix))]
                let sigint_recv = std::future::pending::<()>();

                tokio::select! {
                    _ = sigint_recv => {
                        let _ = tx.send(Event::Shutdown);
                        break;
                    }
                    maybe_event = crossterm_event => {
                        match maybe_event {
                            Some(Ok(CrosstermEvent::Key(key))) => {
                                // Windows delivers both press and release
                                if key.kind == KeyEventKind::Press {
                                    let _ = tx.send(Event::Key(key));
                                }
                            }
                            Some(Ok(CrosstermEvent::Resize(w, h))) => {
                                let _ = tx.send(Event::Resize(w, h));
                            }
                            Some(Ok(_)) => {}
                            Some(Err(_)) | None => break,
                        }
                    }
                }
            }
        });

        Self {
            rx,
            handler: Some(handler),
        }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Clean up the reader task.
    pub fn shutdown(mut self) {
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
