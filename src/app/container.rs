use std::sync::Arc;

use crate::adapters::{FFmpegAdapter, FFprobeAdapter, IndexerConfig};
use crate::app::index_interactor::IndexInteractor;
use crate::app::job_controller::IndexService;
use crate::engine::process::ProcessRegistry;
use crate::ports::{ExecutePort, ProbePort};

pub trait AppContainer: Send + Sync {
    fn index_service(&self) -> Arc<IndexService>;
    fn registry(&self) -> Arc<ProcessRegistry>;
}

pub struct DefaultAppContainer {
    index_service: Arc<IndexService>,
    registry: Arc<ProcessRegistry>,
}

impl DefaultAppContainer {
    /// Wire the ffmpeg/ffprobe adapters described by `config`
    pub fn new(config: &IndexerConfig) -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        let probe_port = Arc::new(FFprobeAdapter::new(&config.ffprobe_path, Arc::clone(&registry)));
        let execute_port = Arc::new(FFmpegAdapter::new(&config.ffmpeg_path, Arc::clone(&registry)));

        Self::with_ports(
            config,
            probe_port as Arc<dyn ProbePort>,
            execute_port as Arc<dyn ExecutePort>,
            registry,
        )
    }

    /// Wire custom port implementations, sharing `registry` for cancellation
    pub fn with_ports(
        config: &IndexerConfig,
        probe_port: Arc<dyn ProbePort>,
        execute_port: Arc<dyn ExecutePort>,
        registry: Arc<ProcessRegistry>,
    ) -> Self {
        let interactor = Arc::new(IndexInteractor::new(
            probe_port,
            execute_port,
            config.processing_dir.clone(),
            config.subtitle_config(),
            config.segment.clone(),
        ));

        let index_service = Arc::new(IndexService::new(
            interactor,
            Arc::clone(&registry),
            config.processing_dir.clone(),
            config.shutdown_grace(),
        ));

        Self {
            index_service,
            registry,
        }
    }
}

impl AppContainer for DefaultAppContainer {
    fn index_service(&self) -> Arc<IndexService> {
        Arc::clone(&self.index_service)
    }

    fn registry(&self) -> Arc<ProcessRegistry> {
        Arc::clone(&self.registry)
    }
}
