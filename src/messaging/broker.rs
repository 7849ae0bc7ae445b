use crate::config::MessageBrokerConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use deadpool_lapin::{Config, Manager, Pool};
use lapin::{
    options::{BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Seam between the ingestion loop and the concrete transport
#[async_trait]
pub trait ScanBroker: Send + Sync {
    /// Create a consumer bound to the given routing pattern. Each call
    /// declares a fresh queue, so it is also the resubscription path after
    /// a transport failure.
    async fn consume_pattern(&self, pattern: &str) -> Result<Consumer>;
}

/// RabbitMQ message broker implementation
pub struct MessageBroker {
    /// Connection pool
    pool: Pool,
    /// Configuration
    config: MessageBrokerConfig,
    /// Default channel
    channel: Arc<Mutex<Option<Channel>>>,
}

impl MessageBroker {
    /// Create a new message broker
    pub async fn new(config: MessageBrokerConfig) -> Result<Self> {
        // Create pool config using the deadpool-lapin API
        let pool_config = Config {
            url: Some(config.uri.clone()),
            pool: Some(deadpool_lapin::PoolConfig {
                max_size: config.pool_size as usize,
                queue_mode: deadpool::managed::QueueMode::Fifo,
                timeouts: deadpool::managed::Timeouts {
                    wait: Some(Duration::from_millis(config.timeout_ms)),
                    create: Some(Duration::from_millis(config.timeout_ms)),
                    recycle: Some(Duration::from_millis(config.timeout_ms)),
                },
            }),
            connection_properties: ConnectionProperties::default(),
        };
        let pool = pool_config.create_pool(Some(deadpool_lapin::Runtime::Tokio1))?;

        let broker = Self {
            pool,
            config,
            channel: Arc::new(Mutex::new(None)),
        };

        // Initialize broker (create exchanges)
        broker.init().await?;

        Ok(broker)
    }

    /// Initialize the message broker (create exchanges)
    async fn init(&self) -> Result<()> {
        let conn = self.get_amqp_connection().await?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| Error::Transport(format!("Failed to create RabbitMQ channel: {}", e)))?;

        // Declare the exchange the readers publish to
        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Transport(format!("Failed to declare exchange: {}", e)))?;

        // Declare the dead letter exchange
        channel
            .exchange_declare(
                &self.config.dead_letter_exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Transport(format!("Failed to declare DLX exchange: {}", e)))?;

        // Store default channel
        let mut default_channel = self.channel.lock().await;
        *default_channel = Some(channel);

        info!("RabbitMQ message broker initialized");

        Ok(())
    }

    /// Get a connection from the pool with retry
    async fn get_connection(&self) -> Result<deadpool::managed::Object<Manager>> {
        let mut attempts = 0;
        let max_attempts = self.config.retry_attempts;

        loop {
            attempts += 1;
            match self.pool.get().await {
                Ok(conn) => return Ok(conn),
                Err(err) => {
                    if attempts >= max_attempts {
                        return Err(Error::Transport(format!(
                            "Failed to get RabbitMQ connection after {} attempts: {}",
                            attempts, err
                        ))
                        .into());
                    }

                    warn!(
                        "Failed to get RabbitMQ connection (attempt {}/{}): {}",
                        attempts, max_attempts, err
                    );

                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }

    /// Get the AMQP connection from a pool object
    async fn get_amqp_connection(&self) -> Result<Connection> {
        // Warm the pool first so connection failures surface with retries
        let _conn = self.get_connection().await?;
        let amqp_conn = Connection::connect(&self.config.uri, ConnectionProperties::default())
            .await
            .map_err(|e| Error::Transport(format!("Failed to create AMQP connection: {}", e)))?;

        Ok(amqp_conn)
    }

    /// Get the default channel or create a new one
    async fn get_channel(&self) -> Result<Channel> {
        let mut channel_guard = self.channel.lock().await;

        if let Some(channel) = &*channel_guard {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }

        // If we get here, we need a new channel
        let conn = self.get_amqp_connection().await?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| Error::Transport(format!("Failed to create RabbitMQ channel: {}", e)))?;

        *channel_guard = Some(channel.clone());

        Ok(channel)
    }

    /// Create a consumer queue for the given routing pattern
    async fn create_consumer_queue(&self, pattern: &str) -> Result<Consumer> {
        let channel = self.get_channel().await?;

        // Create a queue with a unique name
        let queue_name = format!("asset_tracker.{}.{}", pattern.replace('.', "_"), Uuid::new_v4());

        // Declare arguments for dead letter exchange
        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            lapin::types::AMQPValue::LongString(self.config.dead_letter_exchange.clone().into()),
        );

        // Declare the queue
        let _queue = channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                args,
            )
            .await
            .map_err(|e| Error::Transport(format!("Failed to declare queue: {}", e)))?;

        debug!("Created queue: {} for pattern: {}", queue_name, pattern);

        // Bind queue to exchange
        channel
            .queue_bind(
                &queue_name,
                &self.config.exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind queue: {}", e)))?;

        // Create consumer
        let consumer = channel
            .basic_consume(
                &queue_name,
                &format!("consumer-{}", Uuid::new_v4()),
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Transport(format!("Failed to create consumer: {}", e)))?;

        Ok(consumer)
    }
}

#[async_trait]
impl ScanBroker for MessageBroker {
    async fn consume_pattern(&self, pattern: &str) -> Result<Consumer> {
        self.create_consumer_queue(pattern).await
    }
}

/// Create a message broker service
pub async fn create_message_broker(config: MessageBrokerConfig) -> Result<Arc<MessageBroker>> {
    let broker = MessageBroker::new(config).await?;

    Ok(Arc::new(broker))
}
