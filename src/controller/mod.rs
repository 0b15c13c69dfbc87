//! 采集生命周期控制器
//!
//! 所有改变状态的操作都需要 `&mut self`，多线程共享时由调用方包一层 `Mutex`，
//! 这样并发的第二个 `start` 会看到 RUNNING 并得到 `InvalidState`。
//!
//! 本地阶段只根据远端观测推进，不依赖本地计时。

pub mod phase;
pub mod status;
pub mod wait;

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::config::{ClientSettings, ConfigPatch, WriterConfig};
use crate::error::{ConfigViolation, ProbeError, WriterError, WriterResult};
use crate::flusher::{FlushReport, StreamFlusher};
use crate::infra::{HttpControlApi, ZmqStreamConnector};
use crate::probe::{ConnectionState, FailureKind, ServiceProbe};
use crate::progress::progress_message;
use crate::reconciler::{merge, StatusReconciler};
use crate::remote::{ControlApi, Endpoints, RemotePhase, StartRequest, StreamConnector, WriterStatistics};

pub use phase::RunPhase;
pub use status::{RunSlots, RunStatus};
pub use wait::{Deadline, InactivityTracker, Outcome};

/// verbose 时记 info，否则记 debug
macro_rules! note {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// 远端帧写入服务的生命周期控制器
pub struct LifecycleController {
    api: Box<dyn ControlApi>,
    stream: Box<dyn StreamConnector>,
    settings: ClientSettings,
    phase: RunPhase,
    config: Option<WriterConfig>,
    slots: RunSlots,
    run_counter: u64,
    started: Option<Instant>,
    /// 本次 run 中远端是否报告过活跃
    seen_active: bool,
    /// 启动前远端记录的上一次 run 统计
    baseline: Option<WriterStatistics>,
}

impl LifecycleController {
    /// 使用给定的远端实现创建控制器
    pub fn new(
        settings: ClientSettings,
        api: Box<dyn ControlApi>,
        stream: Box<dyn StreamConnector>,
    ) -> Self {
        Self {
            api,
            stream,
            settings,
            phase: RunPhase::Idle,
            config: None,
            slots: RunSlots::new(),
            run_counter: 0,
            started: None,
            seen_active: false,
            baseline: None,
        }
    }

    /// 使用 HTTP 控制 API 和 ZeroMQ 数据流创建控制器
    pub fn connect(settings: ClientSettings) -> Result<Self> {
        let api = HttpControlApi::from_settings(&settings)?;
        let stream = ZmqStreamConnector::new()?;
        Ok(Self::new(settings, Box::new(api), Box::new(stream)))
    }

    // ==================== 访问器 ====================

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn configuration(&self) -> Option<&WriterConfig> {
        self.config.as_ref()
    }

    /// 当前 run 的本地快照（不访问远端）
    pub fn current_run(&self) -> &RunStatus {
        self.slots.current()
    }

    /// 上一次结束的 run
    pub fn last_run(&self) -> Option<&RunStatus> {
        self.slots.last_run()
    }

    // ==================== 配置 ====================

    /// 设置完整配置
    ///
    /// 配置先规范化再校验；校验失败时返回全部违规项，阶段和原配置都不变。
    /// RUNNING / STOPPING 时不允许修改。终止阶段下重新配置会丢弃当前 run 的快照。
    pub fn configure(&mut self, config: WriterConfig, verbose: bool) -> WriterResult<&WriterConfig> {
        if !self.phase.accepts_configuration() {
            return Err(WriterError::invalid_state("configure", self.phase));
        }

        let config = config.normalized();
        let violations = config.violations();
        if !violations.is_empty() {
            note!(verbose, violations = violations.len(), "Rejected writer configuration");
            return Err(WriterError::Configuration { violations });
        }

        let endpoints = self.endpoints_for(&config);
        if *self.api.endpoints() != endpoints {
            debug_endpoints(&endpoints);
            self.api.set_endpoints(endpoints);
        }

        if config.debug {
            tracing::info!(request = ?StartRequest::from_config(&config), "Writer start payload");
        }
        note!(
            verbose,
            output_file = %config.output_file,
            n_frames = config.n_frames,
            "Writer configured"
        );

        if self.phase.is_terminal() {
            self.slots.clear_current(RunPhase::Configured);
        }
        self.phase = RunPhase::Configured;
        self.slots.set_phase(RunPhase::Configured);
        Ok(&*self.config.insert(config))
    }

    /// 部分更新；尚未配置时以客户端默认地址为基础
    pub fn reconfigure(&mut self, patch: ConfigPatch, verbose: bool) -> WriterResult<&WriterConfig> {
        let base = self
            .config
            .clone()
            .unwrap_or_else(|| WriterConfig::from_settings(&self.settings));
        self.configure(base.apply(patch), verbose)
    }

    /// 校验当前配置，不访问远端
    pub fn validate_configuration(&self, verbose: bool) -> WriterResult<()> {
        let Some(config) = &self.config else {
            return Err(WriterError::Configuration {
                violations: vec![ConfigViolation::new("configuration", "writer is not configured")],
            });
        };
        let violations = config.violations();
        if violations.is_empty() {
            note!(verbose, "Writer configuration is valid");
            Ok(())
        } else {
            Err(WriterError::Configuration { violations })
        }
    }

    // ==================== 数据流 ====================

    /// 清空数据流残留消息，run 进行中不允许
    pub fn flush_stream(&self, timeout: Duration, verbose: bool) -> WriterResult<FlushReport> {
        if self.phase.is_active() {
            return Err(WriterError::invalid_state("flush the stream", self.phase));
        }
        let flusher = StreamFlusher::new(self.settings.flush_attempt());
        let report = flusher.flush(self.stream.as_ref(), self.stream_address(), timeout, verbose)?;
        Ok(report)
    }

    // ==================== 生命周期 ====================

    /// 启动一次采集
    ///
    /// 只允许在 CONFIGURED 下调用。远端已有活跃写入进程时拒绝。
    /// 远端拒绝启动时进入 ERROR。`wait` 为 true 时等待 run 结束或 `timeout` 到期，
    /// 超时不改变阶段。
    pub fn start(&mut self, wait: bool, timeout: Duration, verbose: bool) -> WriterResult<Outcome> {
        if self.phase != RunPhase::Configured {
            return Err(WriterError::invalid_state("start", self.phase));
        }
        self.validate_configuration(false)?;
        let config = match &self.config {
            Some(config) => config.clone(),
            None => return Err(WriterError::invalid_state("start", self.phase)),
        };

        let remote = self.api.status()?;
        if remote.is_active() {
            return Err(WriterError::InvalidState {
                operation: "start",
                phase: self.phase,
                detail: Some(format!("remote writer is already {}", remote)),
            });
        }

        self.baseline = StatusReconciler::new(self.api.as_ref()).poll_last_run().ok();

        let request = StartRequest::from_config(&config);
        if config.debug {
            tracing::info!(request = ?request, "Submitting start request");
        }
        let response = self.api.start(&request)?;

        self.run_counter += 1;
        let run_id = self.run_counter;
        let mut status = RunStatus::started(run_id, config.n_frames);

        if !response.success {
            let reason = response.reason();
            tracing::warn!(run_id, reason = %reason, "Writer refused to start");
            status.last_error = Some(reason.clone());
            self.slots.replace_current(status);
            self.started = None;
            self.transition(RunPhase::Error, verbose);
            return Err(WriterError::AcquisitionFailed { run_id, reason });
        }

        self.slots.replace_current(status);
        self.started = Some(Instant::now());
        self.seen_active = false;
        self.transition(RunPhase::Running, verbose);
        note!(verbose, run_id, output_file = %config.output_file, "Writer started");

        if wait {
            self.poll_until_terminal(timeout, verbose)
        } else {
            Ok(Outcome::Accepted(self.slots.current().clone()))
        }
    }

    /// 请求优雅停止
    ///
    /// 已处于终止阶段时不做任何事，返回 `AlreadyFinished`。
    pub fn stop(&mut self, wait: bool, timeout: Duration, verbose: bool) -> WriterResult<Outcome> {
        if self.phase.is_terminal() {
            note!(verbose, phase = %self.phase, "Stop requested but the run is already over");
            return Ok(Outcome::AlreadyFinished(self.slots.current().clone()));
        }
        if self.phase != RunPhase::Running {
            return Err(WriterError::invalid_state("stop", self.phase));
        }

        let response = self.api.stop()?;
        if !response.success {
            return Err(ProbeError::Rejected {
                command: "stop",
                reason: response.reason(),
            }
            .into());
        }

        self.transition(RunPhase::Stopping, verbose);
        if wait {
            self.poll_until_terminal(timeout, verbose)
        } else {
            Ok(Outcome::Accepted(self.slots.current().clone()))
        }
    }

    /// 立即终止写入进程
    ///
    /// 远端确认后无条件进入 FINISHED，不再核对远端之前的状态。
    pub fn kill(&mut self, verbose: bool) -> WriterResult<Outcome> {
        if self.phase.is_terminal() {
            note!(verbose, phase = %self.phase, "Kill requested but the run is already over");
            return Ok(Outcome::AlreadyFinished(self.slots.current().clone()));
        }
        if !self.phase.is_active() {
            return Err(WriterError::invalid_state("kill", self.phase));
        }

        let remote = self.api.kill()?;
        if !remote.is_completed() {
            return Err(ProbeError::Rejected {
                command: "kill",
                reason: format!("writer reported '{}'", remote),
            }
            .into());
        }

        self.refresh_uptime();
        self.slots.current_mut().remote_phase = Some(remote);
        self.transition(RunPhase::Finished, verbose);
        Ok(Outcome::Finished(self.slots.current().clone()))
    }

    /// 等待 run 结束或超时，本身不改变阶段
    pub fn wait(&mut self, timeout: Duration, verbose: bool) -> WriterResult<Outcome> {
        if self.phase.is_terminal() {
            return Ok(Outcome::AlreadyFinished(self.slots.current().clone()));
        }
        if !self.phase.is_active() {
            return Err(WriterError::invalid_state("wait", self.phase));
        }
        self.poll_until_terminal(timeout, verbose)
    }

    /// 等待已写入帧数达到 `n_frames`
    ///
    /// `inactivity_timeout` 内帧数没有任何增长时返回 `AcquisitionStalled`；
    /// `None` 表示不限时。run 提前结束时返回 `Finished`。
    pub fn wait_n_frames(
        &mut self,
        n_frames: u64,
        inactivity_timeout: Option<Duration>,
        verbose: bool,
    ) -> WriterResult<Outcome> {
        if self.phase.is_terminal() {
            return Ok(Outcome::AlreadyFinished(self.slots.current().clone()));
        }
        if !self.phase.is_active() {
            return Err(WriterError::invalid_state("wait for frames", self.phase));
        }

        let mut tracker = InactivityTracker::new(self.slots.current().written_frames);
        loop {
            self.refresh(verbose)?;
            let written = self.slots.current().written_frames;

            if written >= n_frames {
                note!(verbose, written, target = n_frames, "Frame target reached");
                return Ok(Outcome::FramesReached(self.slots.current().clone()));
            }
            match self.phase {
                RunPhase::Finished => return Ok(Outcome::Finished(self.slots.current().clone())),
                RunPhase::Error => return Err(self.acquisition_failure()),
                _ => {}
            }

            let idle = tracker.observe(written);
            let nap = match inactivity_timeout {
                Some(limit) if idle >= limit => {
                    tracing::warn!(
                        written,
                        target = n_frames,
                        idle_ms = idle.as_millis() as u64,
                        "No frames written within the inactivity timeout"
                    );
                    return Err(WriterError::AcquisitionStalled {
                        run_id: self.slots.current().run_id,
                        written,
                        expected: n_frames,
                        idle,
                    });
                }
                Some(limit) => self.settings.poll_interval().min(tracker.remaining(limit)),
                None => self.settings.poll_interval(),
            };

            if verbose {
                tracing::info!("{}", self.progress_line());
            }
            if !nap.is_zero() {
                std::thread::sleep(nap);
            }
        }
    }

    /// 从 FINISHED / ERROR 回到 IDLE
    ///
    /// 当前 run 被清空，上一次 run 和配置保留。
    pub fn reset(&mut self, verbose: bool) -> WriterResult<()> {
        if !self.phase.is_terminal() {
            return Err(WriterError::invalid_state("reset", self.phase));
        }
        self.slots.clear_current(RunPhase::Idle);
        self.started = None;
        self.seen_active = false;
        self.baseline = None;
        self.phase = RunPhase::Idle;
        note!(verbose, "Controller reset to IDLE");
        Ok(())
    }

    /// 接管远端已在运行的写入进程
    ///
    /// 只在 IDLE / CONFIGURED 下有效；远端不活跃时返回 `false`，阶段不变。
    pub fn attach(&mut self, verbose: bool) -> WriterResult<bool> {
        if !matches!(self.phase, RunPhase::Idle | RunPhase::Configured) {
            return Err(WriterError::invalid_state("attach", self.phase));
        }

        let observation = StatusReconciler::new(self.api.as_ref()).poll_current()?;
        if !observation.phase.is_active() {
            note!(verbose, remote = %observation.phase, "No active writer to attach to");
            return Ok(false);
        }

        self.run_counter += 1;
        let expected = observation
            .statistics
            .as_ref()
            .and_then(|s| s.n_frames)
            .or_else(|| self.config.as_ref().map(|c| c.n_frames))
            .unwrap_or(0);
        let fresh = RunStatus::started(self.run_counter, expected);
        self.slots.replace_current(merge(&fresh, observation));
        // 启动时间未知，uptime 从接管时算起
        self.started = Some(Instant::now());
        self.seen_active = true;
        self.transition(RunPhase::Running, verbose);
        note!(verbose, run_id = self.run_counter, "Attached to running writer");
        Ok(true)
    }

    // ==================== 查询 ====================

    /// 当前 run 状态；run 活跃时先与远端对账
    pub fn get_status(&mut self, verbose: bool) -> WriterResult<RunStatus> {
        if self.phase.is_active() {
            self.refresh(verbose)?;
        }
        Ok(self.slots.current().clone())
    }

    /// 写入进程统计；run 不活跃或写入进程不可达时回退到上一次 run 的统计
    pub fn get_statistics(&self, verbose: bool) -> WriterResult<Option<WriterStatistics>> {
        if self.phase.is_active() {
            if let Some(stats) = self.api.statistics()? {
                note!(verbose, stats = ?stats, "Writer statistics");
                return Ok(Some(stats));
            }
        }
        match self.api.last_run_statistics() {
            Ok(stats) => {
                note!(verbose, stats = ?stats, "Last run statistics");
                Ok(Some(stats))
            }
            Err(e) => match ServiceProbe::classify(&e) {
                FailureKind::Unreachable => {
                    note!(verbose, error = %e, "Last run statistics unreachable");
                    Ok(None)
                }
                FailureKind::Application => Err(e.into()),
            },
        }
    }

    /// 上一次 run 的统计
    pub fn get_statistics_last_run(&self, verbose: bool) -> WriterResult<WriterStatistics> {
        let stats = StatusReconciler::new(self.api.as_ref()).poll_last_run()?;
        note!(verbose, stats = ?stats, "Last run statistics");
        Ok(stats)
    }

    /// 上一次 run 的远端状态
    pub fn get_status_last_run(&self, verbose: bool) -> WriterResult<RemotePhase> {
        let stats = self.get_statistics_last_run(verbose)?;
        Ok(stats
            .phase()
            .unwrap_or_else(|| RemotePhase::Other("unknown".to_string())))
    }

    /// 已写入帧数
    pub fn get_written_frames(&self, verbose: bool) -> WriterResult<Option<u64>> {
        let frames = StatusReconciler::new(self.api.as_ref()).get_written_frames(self.phase)?;
        note!(verbose, frames = ?frames, "Written frames");
        Ok(frames)
    }

    /// 一行进度描述，远端不可达时给出"不可用"
    pub fn get_progress_message(&self) -> String {
        match self.get_statistics(false) {
            Ok(stats) => progress_message(stats.as_ref()),
            Err(e) => {
                tracing::debug!(error = %e, "Statistics unavailable for progress message");
                progress_message(None)
            }
        }
    }

    /// 服务端日志
    pub fn get_server_log(&self, verbose: bool) -> WriterResult<String> {
        let log = self.api.log()?;
        note!(verbose, bytes = log.len(), "Fetched server log");
        Ok(log)
    }

    /// 服务端运行时长
    pub fn get_server_uptime(&self, verbose: bool) -> WriterResult<String> {
        let uptime = self.api.uptime()?;
        note!(verbose, uptime = %uptime, "Fetched server uptime");
        Ok(uptime)
    }

    /// 服务端最近一次错误
    pub fn get_server_error(&self, verbose: bool) -> WriterResult<Option<String>> {
        let error = self.api.error()?;
        note!(verbose, error = ?error, "Fetched server error");
        Ok(error)
    }

    /// 控制 API 是否可达，每次都重新探测
    pub fn is_connected(&self, verbose: bool) -> bool {
        let connected = ServiceProbe::is_connected(self.api.as_ref());
        note!(verbose, connected, "Control API probe");
        connected
    }

    /// 控制 API 与数据流的连通性
    pub fn connection_state(&self, verbose: bool) -> ConnectionState {
        let state = ServiceProbe::connection_state(
            self.api.as_ref(),
            self.stream.as_ref(),
            self.stream_address(),
            self.settings.request_timeout(),
        );
        note!(verbose, control_api = state.control_api, stream = state.stream, "Connection probe");
        state
    }

    // ==================== 内部 ====================

    /// 轮询直到终止阶段；ERROR 以 `AcquisitionFailed` 返回
    fn poll_until_terminal(&mut self, timeout: Duration, verbose: bool) -> WriterResult<Outcome> {
        let deadline = Deadline::after(timeout);
        loop {
            self.refresh(verbose)?;
            match self.phase {
                RunPhase::Finished => return Ok(Outcome::Finished(self.slots.current().clone())),
                RunPhase::Error => return Err(self.acquisition_failure()),
                _ => {}
            }
            if deadline.expired() {
                note!(
                    verbose,
                    phase = %self.phase,
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for the writer"
                );
                return Ok(Outcome::TimedOut(self.slots.current().clone()));
            }
            if verbose {
                tracing::info!("{}", self.progress_line());
            }
            deadline.sleep(self.settings.poll_interval());
        }
    }

    /// 与远端对账并推进阶段；远端不可达时快照和阶段都不变
    fn refresh(&mut self, verbose: bool) -> WriterResult<()> {
        let next = StatusReconciler::new(self.api.as_ref()).reconcile(self.slots.current())?;
        let remote = next
            .remote_phase
            .clone()
            .unwrap_or_else(|| RemotePhase::Other("unknown".to_string()));
        if remote.is_active() || (!self.seen_active && remote.is_completed() && self.recorded_remotely()) {
            self.seen_active = true;
        }

        let target = phase::observe(self.phase, &remote, self.seen_active);
        self.slots.replace_current(next);
        self.refresh_uptime();
        self.transition(target, verbose);
        Ok(())
    }

    /// 远端的上一次 run 记录已换成本次 run
    ///
    /// 短 run 可能在两次轮询之间开始并结束；启动前的旧记录不算。
    fn recorded_remotely(&self) -> bool {
        let Some(output_file) = self.config.as_ref().map(|c| c.output_file.as_str()) else {
            return false;
        };
        match StatusReconciler::new(self.api.as_ref()).poll_last_run() {
            Ok(stats) => {
                self.baseline.as_ref() != Some(&stats)
                    && stats.output_file.as_deref() == Some(output_file)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Last run statistics unavailable while starting");
                false
            }
        }
    }

    fn refresh_uptime(&mut self) {
        if let Some(started) = self.started {
            self.slots.current_mut().uptime = Some(started.elapsed());
        }
    }

    /// 切换阶段；进入终止阶段时把当前 run 复制到上一次 run
    fn transition(&mut self, to: RunPhase, verbose: bool) {
        self.slots.set_phase(to);
        if to == self.phase {
            return;
        }
        note!(verbose, from = %self.phase, to = %to, run_id = self.slots.current().run_id, "Run phase changed");
        self.phase = to;
        if to.is_terminal() {
            self.absorb_final_count();
            self.slots.complete();
        }
    }

    /// run 结束后远端的最终帧数可能比最后一次轮询更大
    fn absorb_final_count(&mut self) {
        if self.started.is_none() {
            return;
        }
        let Some(output_file) = self.config.as_ref().map(|c| c.output_file.clone()) else {
            return;
        };
        match StatusReconciler::new(self.api.as_ref()).poll_last_run() {
            Ok(stats) if stats.output_file.as_deref() == Some(output_file.as_str()) => {
                let current = self.slots.current_mut();
                if let Some(n) = stats.n_written_frames {
                    current.written_frames = current.written_frames.max(n);
                }
                if let Some(n) = stats.n_received_frames {
                    current.received_frames = current.received_frames.max(n);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Final statistics unavailable"),
        }
    }

    fn acquisition_failure(&self) -> WriterError {
        let current = self.slots.current();
        WriterError::AcquisitionFailed {
            run_id: current.run_id,
            reason: current
                .last_error
                .clone()
                .unwrap_or_else(|| "writer reported an error".to_string()),
        }
    }

    fn progress_line(&self) -> String {
        let current = self.slots.current();
        let stats = WriterStatistics {
            status: current.remote_phase.as_ref().map(|p| p.to_string()),
            n_frames: Some(current.expected_frames),
            n_received_frames: Some(current.received_frames),
            n_written_frames: Some(current.written_frames),
            ..Default::default()
        };
        progress_message(Some(&stats))
    }

    fn stream_address(&self) -> &str {
        self.config
            .as_ref()
            .map(|c| c.stream_address.as_str())
            .unwrap_or(self.settings.stream_address.as_str())
    }

    fn endpoints_for(&self, config: &WriterConfig) -> Endpoints {
        let settings = ClientSettings {
            control_api_address: config.control_api_address.clone(),
            ..self.settings.clone()
        };
        Endpoints {
            control_api_address: config.control_api_address.clone(),
            writer_api_address: config.writer_api_address.clone(),
            service_name: settings.resolved_service_name(),
        }
    }
}

fn debug_endpoints(endpoints: &Endpoints) {
    tracing::debug!(
        control_api = %endpoints.control_api_address,
        writer_api = %endpoints.writer_api_address,
        service = %endpoints.service_name,
        "Retargeting control API"
    );
}
