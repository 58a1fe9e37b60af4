use crate::config::AppConfig;
use crate::events::EventBroadcaster;
use crate::modem::types::ModemIncomingMessage;
use crate::modem::ModemManager;
use crate::sms::registry::RECEIVING_STALL_TIMEOUT;
use crate::sms::SmsService;
use crate::TracingReloadHandle;
use anyhow::{bail, Result};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::log::{error, info};

#[cfg(feature = "http-server")]
use crate::{
    config::HTTPConfig,
    http::{create_app, websocket::WebSocketManager},
};

pub struct AppHandles {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}
impl AppHandles {
    pub async fn new(config: AppConfig, _tracing_reload: TracingReloadHandle) -> Result<AppHandles> {
        let mut tasks = Vec::new();

        // Start modem manager
        let (mut modem, main_rx) = ModemManager::new(&config);
        let (modem_handle, modem_sender) = match modem.start().await {
            Ok(handle) => (handle, modem.get_sender()?),
            Err(e) => bail!("Failed to start ModemManager: {:?}", e),
        };
        tasks.push(("Modem Handler", modem_handle));

        // Create event broadcaster (and webhook worker handle).
        let (broadcaster, webhooks_handle) = EventBroadcaster::new(&config);
        if let Some(webhooks_worker) = webhooks_handle {
            tasks.push(("Webhooks Worker", webhooks_worker));
        }

        #[cfg(feature = "http-server")]
        let websocket = broadcaster.clone().and_then(|broadcaster| broadcaster.websocket);

        // Set up the SMS object model service and its receive-path worker.
        let sms_service = SmsService::connect(modem_sender, broadcaster).await?;

        let (cleanup_handle, channel_handle) = Self::start_sms_receiver(main_rx, sms_service.clone());
        tasks.push(("Modem Cleanup", cleanup_handle));
        tasks.push(("Modem Channel", channel_handle));

        // Setup HTTP server if enabled.
        #[cfg(feature = "http-server")]
        if let Some(http_handle) =
            Self::start_http_server(config.http, websocket, sms_service, _tracing_reload)?
        {
            tasks.push(("HTTP Server", http_handle));
        }

        Ok(AppHandles { tasks })
    }

    pub async fn run(self) {
        let futures: Vec<_> = self
            .tasks
            .into_iter()
            .map(|(name, handle)| {
                info!("Starting task: {name}");
                Box::pin(async move {
                    match handle.await {
                        Ok(_) => error!("{name} task completed!"),
                        Err(e) => error!("{name} task failed: {e:?}!"),
                    }
                })
            })
            .collect();

        // Wait for any task to complete. All handles are boxed, so when dropped they are cancelled.
        let (_, _, remaining) = futures::future::select_all(futures).await;
        drop(remaining);
    }

    fn start_sms_receiver(
        mut main_rx: UnboundedReceiver<ModemIncomingMessage>,
        sms_service: SmsService,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let registry = sms_service.registry();
        let cleanup_handle = tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(600)); // 10 minutes

            loop {
                interval.tick().await;
                registry.cleanup_stalled_receiving(RECEIVING_STALL_TIMEOUT).await;
            }
        });

        let receiver = sms_service.receiver();
        let channel_handle = tokio::spawn(async move {
            while let Some(message) = main_rx.recv().await {
                receiver.handle_modem_message(message).await;
            }
        });

        (cleanup_handle, channel_handle)
    }

    #[cfg(feature = "http-server")]
    fn start_http_server(
        config: HTTPConfig,
        websocket: Option<WebSocketManager>,
        sms_service: SmsService,
        _tracing_reload: TracingReloadHandle,
    ) -> Result<Option<JoinHandle<()>>> {
        if !config.enabled {
            info!("HTTP server disabled in config");
            return Ok(None);
        }

        let address = config.address;
        let tls_config = config.tls.clone();

        let app = create_app(config, websocket, sms_service, _tracing_reload)?;
        let handle = tokio::spawn(async move {
            let result = match tls_config {
                Some(_tls_config) => {
                    #[cfg(any(feature = "tls-rustls", feature = "tls-native"))]
                    {
                        info!("Starting HTTPS (secure) server on {address}");

                        #[cfg(feature = "tls-rustls")]
                        {
                            let _ = rustls::crypto::CryptoProvider::install_default(
                                rustls::crypto::aws_lc_rs::default_provider(),
                            );
                            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                                &_tls_config.certificate_path,
                                &_tls_config.key_path,
                            )
                            .await
                            .expect("Failed to load rustls TLS certificates!");
                            axum_server::bind_rustls(address, tls)
                                .serve(app.into_make_service())
                                .await
                                .map_err(anyhow::Error::from)
                        }

                        #[cfg(all(feature = "tls-native", not(feature = "tls-rustls")))]
                        {
                            let tls = axum_server::tls_openssl::OpenSSLConfig::from_pem_file(
                                &_tls_config.certificate_path,
                                &_tls_config.key_path,
                            )
                            .expect("Failed to load openssl TLS certificates!");
                            axum_server::bind_openssl(address, tls)
                                .serve(app.into_make_service())
                                .await
                                .map_err(anyhow::Error::from)
                        }
                    }

                    #[cfg(not(any(feature = "tls-rustls", feature = "tls-native")))]
                    Err(anyhow::anyhow!(
                        "HTTP Server TLS configuration provided but no TLS features enabled. Compile with a TLS backend feature!"
                    ))
                }
                None => {
                    info!("Starting HTTP (insecure) server on {address}");
                    axum_server::bind(address)
                        .serve(app.into_make_service())
                        .await
                        .map_err(anyhow::Error::from)
                }
            };

            if let Err(e) = result {
                error!("Server error: {e:?}");
            }
        });

        Ok(Some(handle))
    }
}
