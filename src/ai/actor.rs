//! Generation actor: runs one request at a time off the caller's task

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::client::GenerationService;
use super::error::GenerationError;
use super::pipeline::{GenerationResponse, Orchestrator};
use crate::mail::MailBody;

/// Commands that can be sent to the generation actor
#[derive(Debug)]
pub enum GenerationCommand {
    /// Generate a reply. Supersedes the request in flight, if any.
    Generate { request_id: u64, prompt: String },
    /// Cancel the request in flight
    Cancel,
    /// Cancel anything in flight and stop
    Shutdown,
}

/// Events emitted by the generation actor
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Generated {
        request_id: u64,
        response: GenerationResponse,
    },
    Failed {
        request_id: u64,
        error: GenerationError,
    },
}

/// Handle for communicating with the generation actor
pub struct GenerationActorHandle {
    pub cmd_tx: mpsc::Sender<GenerationCommand>,
    pub event_rx: mpsc::Receiver<GenerationEvent>,
}

/// Spawn the generation actor task
pub fn spawn_generation_actor<S, B>(
    orchestrator: Arc<Orchestrator<S>>,
    body: Arc<B>,
) -> GenerationActorHandle
where
    S: GenerationService + 'static,
    B: MailBody + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(32);

    tokio::spawn(generation_actor_loop(orchestrator, body, cmd_rx, event_tx));

    GenerationActorHandle { cmd_tx, event_rx }
}

async fn generation_actor_loop<S, B>(
    orchestrator: Arc<Orchestrator<S>>,
    body: Arc<B>,
    mut cmd_rx: mpsc::Receiver<GenerationCommand>,
    event_tx: mpsc::Sender<GenerationEvent>,
) where
    S: GenerationService,
    B: MailBody,
{
    let mut next: Option<(u64, String)> = None;

    loop {
        let (request_id, prompt) = match next.take() {
            Some(queued) => queued,
            None => match cmd_rx.recv().await {
                Some(GenerationCommand::Generate { request_id, prompt }) => (request_id, prompt),
                Some(GenerationCommand::Cancel) => continue,
                Some(GenerationCommand::Shutdown) | None => break,
            },
        };

        let cancel = CancellationToken::new();
        let run = orchestrator.generate(body.as_ref(), &prompt, &cancel);
        tokio::pin!(run);

        // Superseded requests that never started still get a Failed event
        let mut dropped = Vec::new();
        let mut shutdown = false;
        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                cmd = cmd_rx.recv(), if !shutdown => match cmd {
                    Some(GenerationCommand::Generate { request_id: next_id, prompt }) => {
                        tracing::debug!("Request {} superseded by {}", request_id, next_id);
                        cancel.cancel();
                        if let Some((old_id, _)) = next.replace((next_id, prompt)) {
                            dropped.push(old_id);
                        }
                    }
                    Some(GenerationCommand::Cancel) => {
                        cancel.cancel();
                        if let Some((old_id, _)) = next.take() {
                            dropped.push(old_id);
                        }
                    }
                    Some(GenerationCommand::Shutdown) | None => {
                        cancel.cancel();
                        if let Some((old_id, _)) = next.take() {
                            dropped.push(old_id);
                        }
                        shutdown = true;
                    }
                },
            }
        };

        let mut events: Vec<GenerationEvent> = vec![match result {
            Ok(response) => GenerationEvent::Generated {
                request_id,
                response,
            },
            Err(error) => GenerationEvent::Failed { request_id, error },
        }];
        events.extend(dropped.into_iter().map(|request_id| GenerationEvent::Failed {
            request_id,
            error: GenerationError::Cancelled,
        }));

        for event in events {
            if event_tx.send(event).await.is_err() {
                tracing::warn!("Generation actor: event receiver dropped");
                return;
            }
        }

        if shutdown {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{MemoryBody, ScriptedService, reply};
    use crate::config::Config;

    const THREAD: &str = "<div>Are you joining the offsite?</div>";

    fn spawn(service: ScriptedService) -> (GenerationActorHandle, Arc<MemoryBody>) {
        let orchestrator = Arc::new(Orchestrator::new(service, &Config::default()));
        let body = Arc::new(MemoryBody::new(THREAD));
        (spawn_generation_actor(orchestrator, body.clone()), body)
    }

    #[tokio::test]
    async fn test_generate_emits_event() {
        let (mut handle, body) = spawn(ScriptedService::new(vec![reply("Yes, count me in.", None)]));

        handle
            .cmd_tx
            .send(GenerationCommand::Generate {
                request_id: 7,
                prompt: "Accept".to_string(),
            })
            .await
            .unwrap();

        match handle.event_rx.recv().await.unwrap() {
            GenerationEvent::Generated {
                request_id,
                response,
            } => {
                assert_eq!(request_id, 7);
                assert_eq!(response.generated_text, "Yes, count me in.");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(body.written().unwrap().contains("Yes, count me in."));
    }

    #[tokio::test]
    async fn test_cancel_in_flight() {
        let (mut handle, body) = spawn(ScriptedService::hanging());

        handle
            .cmd_tx
            .send(GenerationCommand::Generate {
                request_id: 1,
                prompt: "Accept".to_string(),
            })
            .await
            .unwrap();
        handle.cmd_tx.send(GenerationCommand::Cancel).await.unwrap();

        match handle.event_rx.recv().await.unwrap() {
            GenerationEvent::Failed { request_id, error } => {
                assert_eq!(request_id, 1);
                assert_eq!(error, GenerationError::Cancelled);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(body.written().is_none());
    }

    #[tokio::test]
    async fn test_new_request_supersedes_old() {
        let service = ScriptedService::hanging_on("slow", vec![reply("Second answer", None)]);
        let (mut handle, body) = spawn(service);

        for (request_id, prompt) in [(1, "slow"), (2, "fast")] {
            handle
                .cmd_tx
                .send(GenerationCommand::Generate {
                    request_id,
                    prompt: prompt.to_string(),
                })
                .await
                .unwrap();
        }

        match handle.event_rx.recv().await.unwrap() {
            GenerationEvent::Failed { request_id, error } => {
                assert_eq!(request_id, 1);
                assert_eq!(error, GenerationError::Cancelled);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match handle.event_rx.recv().await.unwrap() {
            GenerationEvent::Generated { request_id, .. } => assert_eq!(request_id, 2),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(body.written().unwrap().contains("Second answer"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_events() {
        let (mut handle, _body) = spawn(ScriptedService::new(vec![]));
        handle.cmd_tx.send(GenerationCommand::Shutdown).await.unwrap();
        assert!(handle.event_rx.recv().await.is_none());
    }
}
