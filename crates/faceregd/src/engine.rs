use facereg_core::{
    DistanceMetric, EnrollOutcome, FaceEmbedder, FaceRegistry, Match, RegistryError, RegistryStatus,
};
use image::DynamicImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Enroll {
        name: String,
        image: Vec<u8>,
        reply: Reply<EnrollOutcome>,
    },
    Recognize {
        image: Vec<u8>,
        metric: DistanceMetric,
        threshold: Option<f32>,
        reply: Reply<Option<Match>>,
    },
    Delete {
        name: String,
        reply: Reply<bool>,
    },
    List {
        reply: Reply<Vec<String>>,
    },
    Status {
        reply: Reply<RegistryStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode `image`, embed it, and enroll it under `name` unless already known.
    pub async fn enroll(&self, name: String, image: Vec<u8>) -> Result<EnrollOutcome, EngineError> {
        self.call(|reply| EngineRequest::Enroll { name, image, reply }).await
    }

    /// Decode `image`, embed it, and match it against the store.
    pub async fn recognize(
        &self,
        image: Vec<u8>,
        metric: DistanceMetric,
        threshold: Option<f32>,
    ) -> Result<Option<Match>, EngineError> {
        self.call(|reply| EngineRequest::Recognize {
            image,
            metric,
            threshold,
            reply,
        })
        .await
    }

    pub async fn delete(&self, name: String) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::Delete { name, reply }).await
    }

    pub async fn list(&self) -> Result<Vec<String>, EngineError> {
        self.call(|reply| EngineRequest::List { reply }).await
    }

    pub async fn status(&self) -> Result<RegistryStatus, EngineError> {
        self.call(|reply| EngineRequest::Status { reply }).await
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread that owns `registry`.
///
/// Requests are handled strictly one at a time, so store reads and writes
/// never interleave.
pub fn spawn_engine<E>(mut registry: FaceRegistry<E>) -> Result<EngineHandle, EngineError>
where
    E: FaceEmbedder + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facereg-engine".into())
        .spawn(move || {
            tracing::info!(store = %registry.store().path().display(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle_request(&mut registry, req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn handle_request<E: FaceEmbedder>(registry: &mut FaceRegistry<E>, req: EngineRequest) {
    match req {
        EngineRequest::Enroll { name, image, reply } => {
            let result = decode(&image)
                .and_then(|img| registry.enroll(&name, &img).map_err(EngineError::from));
            let _ = reply.send(result);
        }
        EngineRequest::Recognize {
            image,
            metric,
            threshold,
            reply,
        } => {
            let result = decode(&image).and_then(|img| {
                registry
                    .recognize(&img, metric, threshold)
                    .map_err(EngineError::from)
            });
            let _ = reply.send(result);
        }
        EngineRequest::Delete { name, reply } => {
            let _ = reply.send(registry.delete(&name).map_err(EngineError::from));
        }
        EngineRequest::List { reply } => {
            let _ = reply.send(registry.list_all().map_err(EngineError::from));
        }
        EngineRequest::Status { reply } => {
            let _ = reply.send(registry.status().map_err(EngineError::from));
        }
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, EngineError> {
    let image = image::load_from_memory(bytes)?;
    tracing::debug!(width = image.width(), height = image.height(), "decoded upload");
    Ok(image)
}
