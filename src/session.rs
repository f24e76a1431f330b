//! 视图会话
//!
//! 每个视图（表格、报表、图表）各自持有一个条件构建器和查询状态。
//! 同一会话同时只允许一个请求在途，每个请求带有递增的序号，
//! 收到的响应若不是最近一次发出的请求的结果则直接丢弃。

use crate::assembler::{Assembler, ChartAxes, ExportOptions, QueryParams, QueryState, ViewKind};
use crate::builder::ConditionBuilder;
use crate::catalog::default_columns;
use crate::client::{Client, Transport, ViewResult};
use crate::error::{QueryError, ValidationError};
use crate::render::{report_title, stat_time_annotation, total_pages};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

/// 在途标记，对应界面上的 loading 状态
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    loading: Arc<AtomicBool>,
}

impl InFlight {
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// 已有请求在途时返回 `RequestInFlight`
    pub fn try_acquire(&self) -> Result<InFlightGuard, ValidationError> {
        self.loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ValidationError::RequestInFlight)?;
        Ok(InFlightGuard { loading: self.loading.clone() })
    }
}

/// 离开作用域时清除在途标记，无论请求成功与否
#[derive(Debug)]
pub struct InFlightGuard {
    loading: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.loading.store(false, Ordering::SeqCst);
    }
}

/// 已发出但尚未收到响应的请求
#[derive(Debug)]
pub struct PendingRequest {
    pub seq: u64,
    pub view: ViewKind,
    pub params: QueryParams,
    _guard: InFlightGuard,
}

pub struct ViewSession {
    view: ViewKind,
    builder: ConditionBuilder,
    state: QueryState,
    assembler: Assembler,
    in_flight: InFlight,
    issued: u64,
    columns: Vec<String>,
    report_name: Option<String>,
    result: Option<ViewResult>,
}

impl ViewSession {
    pub fn new(view: ViewKind, builder: ConditionBuilder, assembler: Assembler, per_page: u32) -> Self {
        let state = QueryState {
            chart: (view == ViewKind::Chart).then(ChartAxes::default),
            ..QueryState::with_page(1, per_page)
        };
        Self {
            view,
            builder,
            state,
            assembler,
            in_flight: InFlight::default(),
            issued: 0,
            columns: default_columns(),
            report_name: None,
            result: None,
        }
    }

    pub fn view(&self) -> ViewKind {
        self.view
    }

    pub fn builder(&self) -> &ConditionBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut ConditionBuilder {
        &mut self.builder
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut QueryState {
        &mut self.state
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    pub fn set_report_name(&mut self, name: Option<String>) {
        self.report_name = name;
    }

    pub fn result(&self) -> Option<&ViewResult> {
        self.result.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_loading()
    }

    /// 按当前构建器内容组装参数，不发请求
    pub fn params(&self) -> Result<QueryParams, QueryError> {
        self.assembler.assemble(self.view, &self.state, &self.builder)
    }

    /// 占用在途标记并组装参数，校验失败时标记随即释放
    pub fn begin(&mut self) -> Result<PendingRequest, QueryError> {
        let guard = self.in_flight.try_acquire().map_err(|e| {
            warn!(view = self.view.as_str(), "请求进行中，忽略本次提交");
            QueryError::from(e)
        })?;
        let params = self.params()?;
        self.issued += 1;
        Ok(PendingRequest {
            seq: self.issued,
            view: self.view,
            params,
            _guard: guard,
        })
    }

    /// 处理响应。过期的响应返回 `Ok(None)` 并被丢弃
    pub fn complete(
        &mut self,
        pending: PendingRequest,
        outcome: Result<ViewResult, QueryError>,
    ) -> Result<Option<&ViewResult>, QueryError> {
        let PendingRequest { seq, view, .. } = pending;
        if seq != self.issued || view != self.view {
            warn!(seq, latest = self.issued, "丢弃过期的响应");
            return Ok(None);
        }
        match outcome {
            Ok(result) => {
                info!(view = view.as_str(), seq, total = ?result.total(), "查询完成");
                self.result = Some(result);
                Ok(self.result.as_ref())
            }
            Err(e) => {
                error!(view = view.as_str(), seq, error = %e, "查询失败");
                Err(e)
            }
        }
    }

    /// 提交当前页，响应过期被丢弃时返回 `Ok(None)`
    pub fn submit<T: Transport>(&mut self, client: &Client<T>) -> Result<Option<&ViewResult>, QueryError> {
        let pending = self.begin()?;
        let outcome = client.fetch(pending.view, &pending.params);
        self.complete(pending, outcome)
    }

    /// 点击查询：回到第一页再提交
    pub fn search<T: Transport>(&mut self, client: &Client<T>) -> Result<Option<&ViewResult>, QueryError> {
        self.goto_page(client, 1)
    }

    /// 翻页失败时页码保持不变
    pub fn goto_page<T: Transport>(
        &mut self,
        client: &Client<T>,
        page: u32,
    ) -> Result<Option<&ViewResult>, QueryError> {
        if page == 0 {
            return Err(ValidationError::InvalidPage.into());
        }
        let previous = self.state.page;
        self.state.page = page;
        let accepted = match self.submit(client) {
            Ok(result) => result.is_some(),
            Err(e) => {
                self.state.page = previous;
                return Err(e);
            }
        };
        Ok(if accepted { self.result.as_ref() } else { None })
    }

    /// 导出当前查询结果的下载地址
    pub fn export_url<T: Transport>(&self, client: &Client<T>) -> Result<Url, QueryError> {
        let state = QueryState {
            export: Some(ExportOptions { columns: self.columns.clone() }),
            ..self.state.clone()
        };
        let params = self.assembler.assemble(self.view, &state, &self.builder)?;
        client.export_url(self.view, &params)
    }

    /// 清空所有输入和结果，在途请求的响应将被丢弃
    pub fn reset(&mut self) {
        self.builder.clear();
        let chart = self.state.chart.clone();
        self.state.reset();
        self.state.chart = chart;
        self.report_name = None;
        self.result = None;
        self.issued += 1;
    }

    pub fn total_pages(&self) -> u64 {
        self.result
            .as_ref()
            .and_then(ViewResult::total)
            .map(|total| total_pages(total, self.state.per_page))
            .unwrap_or(0)
    }

    pub fn report_title(&self) -> String {
        let table_name = match &self.result {
            Some(ViewResult::Report(report)) => report.table_name.as_deref(),
            _ => None,
        };
        report_title(self.report_name.as_deref(), table_name)
    }

    pub fn stat_time_annotation(&self) -> String {
        stat_time_annotation(self.state.stat_time.as_deref())
    }
}
