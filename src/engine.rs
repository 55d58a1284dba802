// src/engine.rs
use crate::drivers::{Sensor, Transport};
use crate::types::*;
use log::{error, info, warn};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const IDLE_SLEEP: Duration = Duration::from_millis(50);

/// Runs the sensor's producer loop on its own thread.
///
/// The thread owns the sensor: every start/stop, offset change and read
/// happens here. It ends on `Shutdown` or when the command sender is dropped,
/// and hands the sensor back through the join handle.
pub fn spawn_thread<T: Transport + 'static>(
    mut sensor: Sensor<T>,
    poll_interval: Duration,
    tx: Sender<SensorEvent>,
    rx_cmd: Receiver<SensorCommand>,
) -> JoinHandle<Sensor<T>> {
    thread::spawn(move || {
        let mut is_streaming = false;
        loop {
            // 1. 命令处理
            for _ in 0..10 {
                let cmd = match rx_cmd.try_recv() {
                    Ok(cmd) => cmd,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => SensorCommand::Shutdown,
                };
                match cmd {
                    SensorCommand::Start => match sensor.start() {
                        Ok(()) => {
                            is_streaming = true;
                            tx.send(SensorEvent::Started).ok();
                        }
                        Err(e) => {
                            error!("start failed: {e}");
                            tx.send(SensorEvent::Error(e.to_string())).ok();
                        }
                    },
                    SensorCommand::Stop => {
                        is_streaming = false;
                        if let Err(e) = sensor.stop() {
                            tx.send(SensorEvent::Error(e.to_string())).ok();
                        }
                        tx.send(SensorEvent::Stopped).ok();
                    }
                    SensorCommand::SetOffset => sensor.set_offset(),
                    SensorCommand::ClearOffset => sensor.clear_offset(),
                    SensorCommand::SetWindowSeconds(s) => {
                        if let Err(e) = sensor.set_window_seconds(s) {
                            warn!("{e}");
                            tx.send(SensorEvent::Error(e.to_string())).ok();
                        }
                    }
                    SensorCommand::SetOutputDataRate(hz) => {
                        if let Err(e) = sensor.set_output_data_rate(hz) {
                            warn!("{e}");
                            tx.send(SensorEvent::Error(e.to_string())).ok();
                        }
                    }
                    SensorCommand::Shutdown => {
                        if is_streaming {
                            if let Err(e) = sensor.stop() {
                                warn!("stop on shutdown failed: {e}");
                            }
                            tx.send(SensorEvent::Stopped).ok();
                        }
                        info!("sensor thread exiting");
                        return sensor;
                    }
                }
            }

            // 2. 数据流
            if is_streaming {
                match sensor.poll() {
                    Ok(0) => {}
                    Ok(n) => {
                        tx.send(SensorEvent::DataReady(n)).ok();
                    }
                    Err(e) => {
                        error!("read failed: {e}");
                        tx.send(SensorEvent::Error(e.to_string())).ok();
                    }
                }
                thread::sleep(poll_interval);
            } else {
                thread::sleep(IDLE_SLEEP);
            }
        }
    })
}
