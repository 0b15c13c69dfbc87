//! 测试公共设施 - 模拟写入服务和数据流
//!
//! `WriterSim` 每次被查询状态时推进一步，测试通过共享的 `Arc<Mutex<_>>` 修改其行为。

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use frame_writer_client::{
    ClientSettings, CommandResponse, ControlApi, Endpoints, LifecycleController, ProbeError,
    RemotePhase, StartRequest, StreamConnector, StreamReceiver, WriterConfig, WriterStatistics,
};

/// 模拟的远端写入服务
#[derive(Debug, Clone)]
pub struct WriterSim {
    /// 当前远端状态字符串
    pub status: String,
    pub written: u64,
    pub received: u64,
    pub n_frames: u64,
    pub output_file: String,
    /// 每次状态查询增加的帧数
    pub frames_per_poll: u64,
    /// 帧数增长到此值后停止
    pub stall_at: Option<u64>,
    /// 达到期望帧数后自动进入 finished
    pub finish_at_target: bool,
    /// start 之后仍报告旧状态的查询次数
    pub startup_polls: usize,
    pub startup_pending: usize,
    pub start_success: bool,
    pub stop_success: bool,
    /// stop 后下一次状态查询是否报告 stopped
    pub stop_confirms: bool,
    pub stop_pending: bool,
    pub kill_status: String,
    pub reachable: bool,
    pub error_message: Option<String>,
    pub last_run: WriterStatistics,
    pub start_calls: usize,
    pub status_polls: usize,
    pub last_request: Option<StartRequest>,
}

impl Default for WriterSim {
    fn default() -> Self {
        Self {
            status: "finished".to_string(),
            written: 0,
            received: 0,
            n_frames: 0,
            output_file: String::new(),
            frames_per_poll: 10,
            stall_at: None,
            finish_at_target: true,
            startup_polls: 0,
            startup_pending: 0,
            start_success: true,
            stop_success: true,
            stop_confirms: true,
            stop_pending: false,
            kill_status: "killed".to_string(),
            reachable: true,
            error_message: None,
            last_run: WriterStatistics {
                status: Some("finished".to_string()),
                n_written_frames: Some(7),
                output_file: Some("/tmp/fwc/previous.h5".to_string()),
                ..Default::default()
            },
            start_calls: 0,
            status_polls: 0,
            last_request: None,
        }
    }
}

impl WriterSim {
    fn is_active(&self) -> bool {
        RemotePhase::parse(&self.status).is_active()
    }

    /// 结束当前 run 并记录上一次 run 统计
    pub fn finish(&mut self, status: &str) {
        self.status = status.to_string();
        self.stop_pending = false;
        self.last_run = WriterStatistics {
            status: Some(status.to_string()),
            n_frames: Some(self.n_frames),
            n_received_frames: Some(self.received),
            n_written_frames: Some(self.written),
            output_file: Some(self.output_file.clone()),
            ..Default::default()
        };
    }

    fn advance(&mut self) {
        if self.startup_pending > 0 {
            self.startup_pending -= 1;
            if self.startup_pending == 0 {
                self.status = "receiving".to_string();
            }
            return;
        }
        if !self.is_active() {
            return;
        }
        if self.stop_pending {
            self.finish("stopped");
            return;
        }
        let mut next = self.written + self.frames_per_poll;
        if let Some(limit) = self.stall_at {
            next = next.min(limit);
        }
        if self.n_frames > 0 {
            next = next.min(self.n_frames);
        }
        self.written = next;
        self.received = next;
        if self.finish_at_target && self.n_frames > 0 && self.written >= self.n_frames {
            self.finish("finished");
        }
    }

    fn current_stats(&self) -> WriterStatistics {
        WriterStatistics {
            status: Some(self.status.clone()),
            n_frames: Some(self.n_frames),
            n_received_frames: Some(self.received),
            n_written_frames: Some(self.written),
            output_file: Some(self.output_file.clone()),
            ..Default::default()
        }
    }
}

/// 基于 `WriterSim` 的控制 API
pub struct MockControlApi {
    sim: Arc<Mutex<WriterSim>>,
    endpoints: Endpoints,
}

impl MockControlApi {
    pub fn new(sim: Arc<Mutex<WriterSim>>) -> Self {
        Self {
            sim,
            endpoints: Endpoints {
                control_api_address: "http://localhost:9901".to_string(),
                writer_api_address: "http://localhost:9555".to_string(),
                service_name: "pco_writer-pco1".to_string(),
            },
        }
    }

    fn unreachable() -> ProbeError {
        ProbeError::Unreachable {
            url: "http://localhost:9901".to_string(),
            reason: "connection refused".to_string(),
        }
    }

    fn with_sim<T>(&self, f: impl FnOnce(&mut WriterSim) -> T) -> Result<T, ProbeError> {
        let mut sim = self.sim.lock().unwrap();
        if !sim.reachable {
            return Err(Self::unreachable());
        }
        Ok(f(&mut sim))
    }
}

impl ControlApi for MockControlApi {
    fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn set_endpoints(&mut self, endpoints: Endpoints) {
        self.endpoints = endpoints;
    }

    fn ack(&self) -> Result<(), ProbeError> {
        self.with_sim(|_| ())
    }

    fn start(&self, request: &StartRequest) -> Result<CommandResponse, ProbeError> {
        self.with_sim(|sim| {
            sim.start_calls += 1;
            sim.last_request = Some(request.clone());
            if !sim.start_success {
                return CommandResponse {
                    success: false,
                    value: Some(serde_json::json!("writer busy")),
                    status: None,
                };
            }
            if sim.startup_polls > 0 {
                sim.startup_pending = sim.startup_polls;
            } else {
                sim.status = "receiving".to_string();
            }
            sim.written = 0;
            sim.received = 0;
            sim.n_frames = request.n_frames.parse().unwrap_or(0);
            sim.output_file = request.output_file.clone();
            CommandResponse {
                success: true,
                value: None,
                status: Some("receiving".to_string()),
            }
        })
    }

    fn stop(&self) -> Result<CommandResponse, ProbeError> {
        self.with_sim(|sim| {
            if !sim.stop_success {
                return CommandResponse {
                    success: false,
                    value: Some(serde_json::json!("writer not running")),
                    status: None,
                };
            }
            if sim.stop_confirms {
                sim.stop_pending = true;
            }
            CommandResponse {
                success: true,
                value: None,
                status: None,
            }
        })
    }

    fn kill(&self) -> Result<RemotePhase, ProbeError> {
        self.with_sim(|sim| {
            let status = sim.kill_status.clone();
            if status == "killed" {
                sim.finish("killed");
            }
            RemotePhase::parse(&status)
        })
    }

    fn status(&self) -> Result<RemotePhase, ProbeError> {
        self.with_sim(|sim| {
            sim.status_polls += 1;
            sim.advance();
            RemotePhase::parse(&sim.status)
        })
    }

    fn statistics(&self) -> Result<Option<WriterStatistics>, ProbeError> {
        self.with_sim(|sim| sim.is_active().then(|| sim.current_stats()))
    }

    fn last_run_statistics(&self) -> Result<WriterStatistics, ProbeError> {
        self.with_sim(|sim| sim.last_run.clone())
    }

    fn error(&self) -> Result<Option<String>, ProbeError> {
        self.with_sim(|sim| sim.error_message.clone())
    }

    fn log(&self) -> Result<String, ProbeError> {
        self.with_sim(|_| "pco_writer started\npco_writer ready".to_string())
    }

    fn uptime(&self) -> Result<String, ProbeError> {
        self.with_sim(|_| "up 3 days, 4 hours".to_string())
    }
}

/// 模拟数据流
#[derive(Clone, Default)]
pub struct MockStream {
    pub messages: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// 源源不断地产生消息
    pub endless: bool,
    pub connect_fails: bool,
}

impl MockStream {
    pub fn with_messages(count: usize) -> Self {
        let stream = Self::default();
        {
            let mut queue = stream.messages.lock().unwrap();
            for i in 0..count {
                queue.push_back(vec![i as u8; 16]);
            }
        }
        stream
    }

    pub fn endless() -> Self {
        Self {
            endless: true,
            ..Default::default()
        }
    }
}

struct MockReceiver {
    stream: MockStream,
}

impl StreamReceiver for MockReceiver {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ProbeError> {
        if self.stream.endless {
            thread::sleep(Duration::from_millis(1));
            return Ok(Some(vec![0u8; 16]));
        }
        let next = self.stream.messages.lock().unwrap().pop_front();
        if next.is_none() {
            thread::sleep(timeout);
        }
        Ok(next)
    }
}

impl StreamConnector for MockStream {
    fn connect(&self, address: &str, _timeout: Duration) -> Result<Box<dyn StreamReceiver>, ProbeError> {
        if self.connect_fails {
            return Err(ProbeError::Stream {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(MockReceiver {
            stream: self.clone(),
        }))
    }
}

/// 快速轮询的客户端设置
pub fn fast_settings() -> ClientSettings {
    ClientSettings {
        poll_interval_ms: 2,
        request_timeout_ms: 100,
        flush_attempt_ms: 20,
        ..Default::default()
    }
}

/// 合法的采集配置
pub fn valid_config(n_frames: u64) -> WriterConfig {
    WriterConfig {
        output_file: "/tmp/fwc/test_run.h5".to_string(),
        dataset_name: "data".to_string(),
        n_frames,
        stream_address: "tcp://127.0.0.1:8080".to_string(),
        control_api_address: "http://localhost:9901".to_string(),
        writer_api_address: "http://localhost:9555".to_string(),
        user_id: 503,
        max_frames_per_file: 20000,
        debug: false,
    }
}

/// 创建控制器，返回共享的模拟状态
pub fn controller_with(sim: WriterSim, stream: MockStream) -> (LifecycleController, Arc<Mutex<WriterSim>>) {
    let sim = Arc::new(Mutex::new(sim));
    let api = MockControlApi::new(sim.clone());
    let controller = LifecycleController::new(fast_settings(), Box::new(api), Box::new(stream));
    (controller, sim)
}

pub fn controller() -> (LifecycleController, Arc<Mutex<WriterSim>>) {
    controller_with(WriterSim::default(), MockStream::default())
}

/// 已配置的控制器
pub fn configured(n_frames: u64) -> (LifecycleController, Arc<Mutex<WriterSim>>) {
    let (mut controller, sim) = controller();
    controller.configure(valid_config(n_frames), false).unwrap();
    (controller, sim)
}

/// 已启动（未等待）的控制器
pub fn running(n_frames: u64) -> (LifecycleController, Arc<Mutex<WriterSim>>) {
    let (mut controller, sim) = configured(n_frames);
    controller.start(false, Duration::ZERO, false).unwrap();
    (controller, sim)
}
