// src/types.rs

// 前台发给采集线程的命令
#[derive(Clone, Debug, PartialEq)]
pub enum SensorCommand {
    Start,
    Stop,
    SetOffset,
    ClearOffset,
    SetWindowSeconds(f64),
    SetOutputDataRate(f64),
    Shutdown,
}

// 采集线程发给前台的消息
#[derive(Clone, Debug, PartialEq)]
pub enum SensorEvent {
    Started,
    Stopped,
    DataReady(usize), // 新完成的样本数
    Error(String),
}
