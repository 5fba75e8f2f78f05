//! # 网络串口桥接
//!
//! 单连接 TCP 服务，把一个固件串口暴露给宿主上的终端或上位机。
//!
//! ## 功能特性
//!
//! - 同步绑定端口，绑定失败立即返回 [`SimError::ListenerBind`]
//! - 独立线程上运行单线程 `tokio` 运行时，不占用固件线程
//! - 新连接替换旧连接
//! - 接收受 `rx` 剩余空间限制，缓冲区满时暂停读取 socket
//! - `tx` 每毫秒发送一次
//!
//! 与固件串口之间的搬运由 [`NetSerialPump`](crate::ipc::NetSerialPump) 完成。
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use neon_sim::ipc::NetSerialPump;
//! use neon_sim::kernel::SimBuilder;
//! use neon_sim::net::NetSerialBridge;
//!
//! let ctx = SimBuilder::new().build().unwrap();
//! let bridge = NetSerialBridge::listen("127.0.0.1:8099").unwrap();
//! ctx.add_transport(Arc::new(NetSerialPump::new(
//!     ctx.serial(0).unwrap().clone(),
//!     bridge.rx(),
//!     bridge.tx(),
//! )));
//! ```

use core::sync::atomic::{AtomicBool, Ordering};
use std::net::{SocketAddr, TcpListener as StdTcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use spin::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle as TaskHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{NET_PACKET_SIZE, NET_POLL_INTERVAL_MS};
use crate::error::{Result, SimError};
use crate::ipc::StreamBuffer;

pub struct NetSerialBridge {
    local_addr: SocketAddr,
    rx: Arc<StreamBuffer>,
    tx: Arc<StreamBuffer>,
    connected: Arc<AtomicBool>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NetSerialBridge {
    /// 绑定地址并开始服务
    ///
    /// # 返回值
    /// - `Ok(NetSerialBridge)`: 已开始监听
    /// - `Err(SimError::ListenerBind)`: 端口绑定失败
    /// - `Err(SimError::Network)`: 运行时或线程创建失败
    pub fn listen(addr: impl ToSocketAddrs + core::fmt::Debug) -> Result<Self> {
        let bind_error = |reason: std::io::Error| SimError::ListenerBind {
            addr: format!("{addr:?}"),
            reason: reason.to_string(),
        };
        let listener = StdTcpListener::bind(&addr).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SimError::Network(e.to_string()))?;

        let rx = Arc::new(StreamBuffer::new());
        let tx = Arc::new(StreamBuffer::new());
        let connected = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = {
            let rx = rx.clone();
            let tx = tx.clone();
            let connected = connected.clone();
            std::thread::Builder::new()
                .name("net_serial".into())
                .spawn(move || {
                    runtime.block_on(serve(listener, rx, tx, connected, shutdown_rx));
                })
                .map_err(|e| SimError::Network(e.to_string()))?
        };

        tracing::info!(%local_addr, "net serial bridge listening");
        Ok(Self {
            local_addr,
            rx,
            tx,
            connected,
            shutdown: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.lock().is_some()
    }

    /// 网络到固件方向的缓冲区
    pub fn rx(&self) -> Arc<StreamBuffer> {
        self.rx.clone()
    }

    /// 固件到网络方向的缓冲区
    pub fn tx(&self) -> Arc<StreamBuffer> {
        self.tx.clone()
    }

    /// 停止服务并等待网络线程退出
    ///
    /// 重复调用只记录错误。
    pub fn stop(&self) {
        let Some(shutdown) = self.shutdown.lock().take() else {
            tracing::error!(addr = %self.local_addr, "net serial bridge stopped twice");
            return;
        };
        // 接收端已经退出时发送失败，不影响后续 join
        let _ = shutdown.send(());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!(addr = %self.local_addr, "net serial thread panicked");
            }
        }
        self.connected.store(false, Ordering::Release);
        tracing::info!(addr = %self.local_addr, "net serial bridge stopped");
    }
}

impl Drop for NetSerialBridge {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

// ============================================================================
// 网络线程
// ============================================================================

async fn serve(
    listener: StdTcpListener,
    rx: Arc<StreamBuffer>,
    tx: Arc<StreamBuffer>,
    connected: Arc<AtomicBool>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "net serial listener registration failed");
            return;
        }
    };

    let mut session: Option<TaskHandle<()>> = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Some(previous) = session.take() {
                        if !previous.is_finished() {
                            tracing::warn!(%peer, "replacing existing net serial client");
                        }
                        previous.abort();
                    }
                    tracing::info!(%peer, "net serial client connected");
                    session = Some(tokio::spawn(client_session(
                        stream,
                        rx.clone(),
                        tx.clone(),
                        connected.clone(),
                    )));
                }
                Err(e) => tracing::warn!(error = %e, "net serial accept failed"),
            },
        }
    }

    if let Some(session) = session {
        session.abort();
    }
}

async fn client_session(
    stream: TcpStream,
    rx: Arc<StreamBuffer>,
    tx: Arc<StreamBuffer>,
    connected: Arc<AtomicBool>,
) {
    connected.store(true, Ordering::Release);
    let (mut reader, mut writer) = stream.into_split();
    let mut interval = tokio::time::interval(Duration::from_millis(NET_POLL_INTERVAL_MS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut inbound = vec![0u8; NET_PACKET_SIZE];
    let mut outbound = vec![0u8; NET_PACKET_SIZE];

    loop {
        let room = rx.free().min(NET_PACKET_SIZE);
        tokio::select! {
            read = reader.read(&mut inbound[..room]), if room > 0 => match read {
                Ok(0) => {
                    tracing::info!("net serial client disconnected");
                    break;
                }
                Ok(count) => {
                    rx.write_slice(&inbound[..count]);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "net serial receive failed");
                    break;
                }
            },
            _ = interval.tick() => {
                let count = tx.read_slice(&mut outbound);
                if count > 0 {
                    if let Err(e) = writer.write_all(&outbound[..count]).await {
                        tracing::warn!(error = %e, "net serial send failed");
                        break;
                    }
                }
            }
        }
    }
    connected.store(false, Ordering::Release);
}
