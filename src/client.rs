//! 后端 REST 接口客户端
//!
//! `Transport` 负责把参数发出去并取回 JSON，`Client` 在其上按视图解析响应。
//! 导出不发起请求，只生成下载地址。

use crate::assembler::{QueryParams, ViewKind};
use crate::error::{ConfigError, QueryError};
use crate::render::{ChartResult, MenuItem, ReportResult, TableResult};
use reqwest::blocking::multipart;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const STUDENTS_QUERY: &str = "/api/students/query";
pub const STUDENTS_EXPORT: &str = "/api/students/export";
pub const STUDENTS_IMPORT: &str = "/api/students/import";
pub const ANALYSIS_REPORT: &str = "/api/analysis/report";
pub const ANALYSIS_EXPORT: &str = "/api/analysis/export";
pub const ANALYSIS_CHART: &str = "/api/analysis/chart";
pub const MENU: &str = "/api/menu";

/// 视图对应的查询接口
pub fn query_path(view: ViewKind) -> &'static str {
    match view {
        ViewKind::Table => STUDENTS_QUERY,
        ViewKind::Report => ANALYSIS_REPORT,
        ViewKind::Chart => ANALYSIS_CHART,
    }
}

/// 视图对应的导出接口，图表没有导出
pub fn export_path(view: ViewKind) -> Option<&'static str> {
    match view {
        ViewKind::Table => Some(STUDENTS_EXPORT),
        ViewKind::Report => Some(ANALYSIS_EXPORT),
        ViewKind::Chart => None,
    }
}

pub trait Transport {
    fn base_url(&self) -> &Url;

    fn get_json(&self, path: &str, params: &QueryParams) -> Result<Value, QueryError>;

    /// 以 multipart 表单上传文件，`fields` 为附带的文本字段
    fn post_file(&self, path: &str, fields: &[(String, String)], file: &Path) -> Result<Value, QueryError>;
}

/// 基于 reqwest 阻塞客户端的实现
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConfigError::new(format!("无效的服务地址 {}: {}", base_url, e)))?;
        let client = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::new(format!("无法创建 HTTP 客户端: {}", e)))?;
        Ok(Self { client, base_url })
    }

    fn read_response(response: reqwest::blocking::Response) -> Result<Value, QueryError> {
        let status = response.status();
        let body = response.text().map_err(network_error)?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| backend_message(&v))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("未知错误").to_string());
            return Err(QueryError::Network { status: Some(status.as_u16()), message });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl Transport for HttpTransport {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn get_json(&self, path: &str, params: &QueryParams) -> Result<Value, QueryError> {
        let url = endpoint_url(&self.base_url, path, params)?;
        debug!(%url, "GET");
        let response = self.client.get(url).send().map_err(network_error)?;
        Self::read_response(response)
    }

    fn post_file(&self, path: &str, fields: &[(String, String)], file: &Path) -> Result<Value, QueryError> {
        let url = endpoint_url(&self.base_url, path, &QueryParams::new())?;
        let mut form = multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
        }
        let form = form
            .file("file", file)
            .map_err(|e| QueryError::network(format!("无法读取文件 {}: {}", file.display(), e)))?;
        debug!(%url, file = %file.display(), "POST");
        let response = self.client.post(url).multipart(form).send().map_err(network_error)?;
        Self::read_response(response)
    }
}

fn network_error(err: reqwest::Error) -> QueryError {
    QueryError::Network {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

fn backend_message(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// 拼接接口地址和查询参数
pub fn endpoint_url(base: &Url, path: &str, params: &QueryParams) -> Result<Url, QueryError> {
    let mut url = base
        .join(path)
        .map_err(|e| ConfigError::new(format!("无法拼接接口地址 {}: {}", path, e)))?;
    if !params.is_empty() {
        url.set_query(Some(&params.to_query_string()));
    }
    Ok(url)
}

/// 一次查询的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ViewResult {
    Table(TableResult),
    Report(ReportResult),
    Chart(ChartResult),
}

impl ViewResult {
    pub fn total(&self) -> Option<u64> {
        match self {
            ViewResult::Table(table) => Some(table.total),
            ViewResult::Report(report) => report.total,
            ViewResult::Chart(_) => None,
        }
    }
}

pub struct Client<T: Transport> {
    transport: T,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn get<R: DeserializeOwned>(&self, path: &str, params: &QueryParams) -> Result<R, QueryError> {
        info!(path, params = params.len(), "发送查询请求");
        let value = self.transport.get_json(path, params)?;
        if let Some(message) = backend_message(&value) {
            return Err(QueryError::Backend(message));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn query_students(&self, params: &QueryParams) -> Result<TableResult, QueryError> {
        self.get(STUDENTS_QUERY, params)
    }

    pub fn report(&self, params: &QueryParams) -> Result<ReportResult, QueryError> {
        self.get(ANALYSIS_REPORT, params)
    }

    pub fn chart(&self, params: &QueryParams) -> Result<ChartResult, QueryError> {
        self.get(ANALYSIS_CHART, params)
    }

    pub fn menu(&self) -> Result<Vec<MenuItem>, QueryError> {
        self.get(MENU, &QueryParams::new())
    }

    /// 按视图发起查询
    pub fn fetch(&self, view: ViewKind, params: &QueryParams) -> Result<ViewResult, QueryError> {
        Ok(match view {
            ViewKind::Table => ViewResult::Table(self.query_students(params)?),
            ViewKind::Report => ViewResult::Report(self.report(params)?),
            ViewKind::Chart => ViewResult::Chart(self.chart(params)?),
        })
    }

    /// 导入学生数据文件，返回后端的提示信息
    pub fn import_file(&self, file: &Path, data_year: Option<&str>) -> Result<String, QueryError> {
        let fields: Vec<(String, String)> = data_year
            .map(str::trim)
            .filter(|year| !year.is_empty())
            .map(|year| ("data_year".to_string(), year.to_string()))
            .into_iter()
            .collect();
        info!(file = %file.display(), "上传数据文件");
        let value = self.transport.post_file(STUDENTS_IMPORT, &fields, file)?;
        if let Some(message) = backend_message(&value) {
            return Err(QueryError::Backend(message));
        }
        Ok(value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("上传成功")
            .to_string())
    }

    /// 导出文件的下载地址
    pub fn export_url(&self, view: ViewKind, params: &QueryParams) -> Result<Url, QueryError> {
        let path = export_path(view)
            .ok_or_else(|| ConfigError::new(format!("{} 视图不支持导出", view.as_str())))?;
        endpoint_url(self.transport.base_url(), path, params)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeTransport;
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        let mut params = QueryParams::new();
        for (name, value) in pairs {
            params.push(name, *value);
        }
        params
    }

    #[test]
    fn test_query_students() {
        let transport = FakeTransport::new().respond(Ok(json!({
            "students": [{"name": "张三", "school": "华兴小学"}],
            "total": 1
        })));
        let client = Client::new(transport);

        let result = client.query_students(&params(&[("page", "1")])).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.students[0]["name"], "张三");

        let requests = client.transport().requests.borrow();
        assert_eq!(requests[0].0, STUDENTS_QUERY);
        assert_eq!(requests[0].1.get("page"), Some("1"));
    }

    #[test]
    fn test_backend_error_field() {
        let transport = FakeTransport::new().respond(Ok(json!({"error": "未设置分组条件"})));
        let client = Client::new(transport);

        let err = client.report(&QueryParams::new()).unwrap_err();
        assert!(matches!(err, QueryError::Backend(ref m) if m == "未设置分组条件"));
    }

    #[test]
    fn test_null_error_field_is_not_failure() {
        let transport = FakeTransport::new().respond(Ok(json!({"error": null, "labels": ["男"], "datasets": []})));
        let client = Client::new(transport);
        let chart = client.chart(&QueryParams::new()).unwrap();
        assert_eq!(chart.labels, vec!["男"]);
    }

    #[test]
    fn test_network_error_passes_through() {
        let transport = FakeTransport::new().respond(Err(QueryError::Network {
            status: Some(500),
            message: "Internal Server Error".to_string(),
        }));
        let client = Client::new(transport);
        let err = client.fetch(ViewKind::Table, &QueryParams::new()).unwrap_err();
        assert!(matches!(err, QueryError::Network { status: Some(500), .. }));
    }

    #[test]
    fn test_malformed_response_is_decode_error() {
        let transport = FakeTransport::new().respond(Ok(json!({"students": "oops"})));
        let client = Client::new(transport);
        let err = client.query_students(&QueryParams::new()).unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
    }

    #[test]
    fn test_export_url() {
        let client = Client::new(FakeTransport::new());
        let url = client
            .export_url(ViewKind::Table, &params(&[("school", "华兴小学"), ("export", "1")]))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:5000/api/students/export?school=%E5%8D%8E%E5%85%B4%E5%B0%8F%E5%AD%A6&export=1"
        );

        let url = client.export_url(ViewKind::Report, &QueryParams::new()).unwrap();
        assert_eq!(url.path(), ANALYSIS_EXPORT);
        assert_eq!(url.query(), None);

        let err = client.export_url(ViewKind::Chart, &QueryParams::new()).unwrap_err();
        assert!(matches!(err, QueryError::Configuration(_)));
    }

    #[test]
    fn test_import_file() {
        let transport = FakeTransport::new()
            .respond(Ok(json!({"message": "成功导入 120 条记录"})))
            .respond(Ok(json!({"error": "文件格式不正确"})));
        let client = Client::new(transport);

        let message = client.import_file(Path::new("students.xlsx"), Some("2024")).unwrap();
        assert_eq!(message, "成功导入 120 条记录");
        let err = client.import_file(Path::new("students.txt"), None).unwrap_err();
        assert!(matches!(err, QueryError::Backend(_)));

        let requests = client.transport().requests.borrow();
        assert_eq!(requests[0].0, STUDENTS_IMPORT);
        assert_eq!(requests[0].1.get("data_year"), Some("2024"));
        assert!(requests[1].1.is_empty());
    }

    #[test]
    fn test_menu() {
        let transport = FakeTransport::new().respond(Ok(json!([
            {"title": "首页", "link": "/", "icon": "house", "sub_menu": []}
        ])));
        let menu = Client::new(transport).menu().unwrap();
        assert_eq!(menu[0].title, "首页");
    }

    #[test]
    fn test_http_transport_rejects_bad_base_url() {
        assert!(HttpTransport::new("not a url", Duration::from_secs(5)).is_err());
        assert!(HttpTransport::new("http://localhost:5000", Duration::from_secs(5)).is_ok());
    }
}
