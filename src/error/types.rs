use thiserror::Error;

/// 仿真内核错误
///
/// 只有两类错误会终止仿真线程：退出请求与监听端口绑定失败。
/// 其余变体是调用方可以处理的参数错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    // 执行控制
    #[error("simulation quit requested")]
    QuitRequested,

    // 定时器相关
    #[error("timer {0} not found")]
    TimerNotFound(usize),
    #[error("invalid frequency {frequency} Hz for timer {timer}")]
    InvalidFrequency { timer: usize, frequency: u64 },

    // 外设相关
    #[error("spi bus {0} not found")]
    BusNotFound(usize),
    #[error("serial port {0} not found")]
    SerialPortNotFound(usize),

    // 网络桥接
    #[error("failed to bind listener on {addr}: {reason}")]
    ListenerBind { addr: String, reason: String },
    #[error("network bridge error: {0}")]
    Network(String),

    // 配置
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SimError {
    /// 是否为终止性错误
    ///
    /// 终止性错误会一路传播到顶层驱动线程。
    pub fn is_terminal(&self) -> bool {
        matches!(self, SimError::QuitRequested | SimError::ListenerBind { .. })
    }
}

pub type Result<T> = core::result::Result<T, SimError>;
