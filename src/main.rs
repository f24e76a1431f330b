use anyhow::{bail, Context};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use vision_query::assembler::{ChartAxes, Sort, FIXED_FIELDS};
use vision_query::client::{Client, HttpTransport, Transport, ViewResult};
use vision_query::command::{parse_line, Command};
use vision_query::config::{ClientConfig, DEFAULT_CONFIG_FILE};
use vision_query::render::{MenuItem, TableView};
use vision_query::session::ViewSession;
use vision_query::{Assembler, ConditionBuilder, FieldRegistry, ViewKind};

#[derive(Parser)]
#[command(name = "vision_query", about = "学生视力档案组合查询客户端")]
struct Cli {
    /// 配置文件路径，文件不存在时使用默认配置
    #[arg(long, env = "VISION_QUERY_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// 覆盖配置文件中的后端地址
    #[arg(long)]
    base_url: Option<String>,

    /// 启动时所在的视图: table, report, chart
    #[arg(long, default_value = "table")]
    view: ViewKind,

    /// 执行一行命令后退出，不进入交互模式
    #[arg(long, short = 'e')]
    exec: Option<String>,
}

/// RUST_LOG 优先，否则使用配置文件中的级别；日志输出到 stderr
fn init_tracing(level: &str) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(level),
    };
    fmt::Subscriber::builder()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// 三个视图各自的会话，以及当前所在的视图
struct Shell {
    registry: Arc<FieldRegistry>,
    active: ViewKind,
    table: ViewSession,
    report: ViewSession,
    chart: ViewSession,
}

impl Shell {
    fn new(registry: Arc<FieldRegistry>, config: &ClientConfig, active: ViewKind) -> Self {
        let assembler = Assembler::with_config(registry.clone(), config.assembler_config());
        let session = |view| {
            ViewSession::new(
                view,
                ConditionBuilder::new(registry.clone()),
                assembler.clone(),
                config.per_page,
            )
        };
        Self {
            table: session(ViewKind::Table),
            report: session(ViewKind::Report),
            chart: session(ViewKind::Chart),
            registry: registry.clone(),
            active,
        }
    }

    fn session(&self) -> &ViewSession {
        match self.active {
            ViewKind::Table => &self.table,
            ViewKind::Report => &self.report,
            ViewKind::Chart => &self.chart,
        }
    }

    fn session_mut(&mut self) -> &mut ViewSession {
        match self.active {
            ViewKind::Table => &mut self.table,
            ViewKind::Report => &mut self.report,
            ViewKind::Chart => &mut self.chart,
        }
    }

    fn prompt(&self) -> String {
        format!("{}> ", self.active.as_str())
    }

    /// 执行一行输入，出错时打印错误并继续
    fn run_line<T: Transport>(&mut self, client: &Client<T>, line: &str) -> Flow {
        let commands = match parse_line(line) {
            Ok(commands) => commands,
            Err(e) => {
                println!("✗ 命令解析失败: {}", e);
                return Flow::Continue;
            }
        };
        for command in commands {
            match self.execute(client, command) {
                Ok(Flow::Quit) => return Flow::Quit,
                Ok(Flow::Continue) => {}
                Err(e) => {
                    // 出错后不再执行同一行中剩余的命令
                    println!("✗ {}", e);
                    break;
                }
            }
        }
        Flow::Continue
    }

    fn execute<T: Transport>(&mut self, client: &Client<T>, command: Command) -> anyhow::Result<Flow> {
        match command {
            Command::Add => {
                let row = self.session_mut().builder_mut().add_row();
                println!("✓ 新增条件行 {}", row);
            }
            Command::Field { row, key } => self.session_mut().builder_mut().select_field(row, &key)?,
            Command::Role { row, role } => self.session_mut().builder_mut().set_role(row, role)?,
            Command::Op { row, operator } => self.session_mut().builder_mut().set_operator(row, operator)?,
            Command::Text { row, value } => self.session_mut().builder_mut().set_text(row, &value)?,
            Command::Range { row, min, max } => self.session_mut().builder_mut().set_range(
                row,
                min.as_deref().unwrap_or_default(),
                max.as_deref().unwrap_or_default(),
            )?,
            Command::Check { row, options, checked } => {
                self.session_mut().builder_mut().set_options_checked(row, options.as_slice(), checked)?
            }
            Command::Toggle { row, option } => {
                let checked = self.session_mut().builder_mut().toggle_option(row, &option)?;
                println!("{} {}", if checked { "[x]" } else { "[ ]" }, option);
            }
            Command::Flag { row, checked } => self.session_mut().builder_mut().set_checked(row, checked)?,
            Command::Remove { row } => self.session_mut().builder_mut().remove_row(row)?,
            Command::Clear => self.session_mut().builder_mut().clear(),
            Command::Show => self.show(),
            Command::Fields { keyword } => self.list_fields(keyword.as_deref()),
            Command::Fixed { key, value } => {
                if !FIXED_FIELDS.contains(&key.as_str()) {
                    bail!("不支持的固定查询字段: {} (可用: {})", key, FIXED_FIELDS.join(", "));
                }
                self.session_mut()
                    .state_mut()
                    .set_fixed(&key, value.as_deref().unwrap_or_default());
            }
            Command::Sort { field, order } => self.session_mut().state_mut().sort = Sort { field, order },
            Command::Page(page) => {
                if self.session_mut().goto_page(client, page)?.is_some() {
                    self.print_result();
                } else {
                    println!("✗ 响应已过期，结果未更新");
                }
            }
            Command::PerPage(per_page) => {
                if per_page == 0 {
                    bail!("每页条数必须大于 0");
                }
                self.session_mut().state_mut().per_page = per_page;
            }
            Command::Template(template) => self.session_mut().state_mut().template = template,
            Command::StatTime(stat_time) => self.session_mut().state_mut().stat_time = stat_time,
            Command::Title(title) => self.session_mut().set_report_name(title),
            Command::Chart { group_by, metric } => {
                self.session_mut().state_mut().chart = Some(ChartAxes { group_by, metric });
            }
            Command::Columns(columns) => self.session_mut().set_columns(columns),
            Command::View(view) => {
                self.active = view;
                println!("✓ 切换到 {} 视图", view.as_str());
            }
            Command::Params => {
                let params = self.session().params()?;
                println!("{}", params);
                println!("{}", params.to_query_string());
            }
            Command::Search => {
                if self.session_mut().search(client)?.is_some() {
                    self.print_result();
                } else {
                    println!("✗ 响应已过期，结果未更新");
                }
            }
            Command::Export => {
                let url = self.session().export_url(client)?;
                println!("下载地址: {}", url);
            }
            Command::Import { path, data_year } => {
                let message = client
                    .import_file(&path, data_year.as_deref())
                    .with_context(|| format!("导入 {} 失败", path.display()))?;
                println!("✓ {}", message);
            }
            Command::Menu => print_menu(&client.menu()?, 0),
            Command::Reset => {
                self.session_mut().reset();
                println!("✓ 已重置 {} 视图", self.active.as_str());
            }
            Command::Help => print_help(),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn show(&self) {
        let session = self.session();
        let state = session.state();
        println!("[{} 视图] 第 {} 页，每页 {} 条", self.active.as_str(), state.page, state.per_page);
        for key in FIXED_FIELDS {
            if let Some(value) = state.fixed.get(key) {
                println!("  {} = {}", self.registry.label(key), value);
            }
        }
        if let Some(template) = &state.template {
            println!("  模板: {}", template);
        }
        if session.builder().is_empty() {
            println!("  (没有组合查询条件)");
        }
        for row in session.builder().view() {
            println!("  {}", row);
        }
    }

    fn list_fields(&self, keyword: Option<&str>) {
        for spec in self.registry.all() {
            let matched = keyword.map_or(true, |k| spec.key.contains(k) || spec.label.contains(k));
            if matched {
                if spec.options.is_empty() {
                    println!("{:<32}{}\t{}", spec.key, spec.label, spec.value_kind.as_str());
                } else {
                    println!(
                        "{:<32}{}\t{}\t{}",
                        spec.key,
                        spec.label,
                        spec.value_kind.as_str(),
                        spec.options.join("/")
                    );
                }
            }
        }
    }

    fn print_result(&self) {
        let session = self.session();
        let Some(result) = session.result() else {
            return;
        };
        match result {
            ViewResult::Table(table) => {
                print!("{}", TableView::project(&table.students, session.columns(), &self.registry));
                println!(
                    "共 {} 条记录，第 {}/{} 页",
                    table.total,
                    session.state().page,
                    session.total_pages()
                );
            }
            ViewResult::Report(report) => {
                let title = session.report_title();
                if !title.is_empty() {
                    println!("{}", title);
                }
                let annotation = session.stat_time_annotation();
                if !annotation.is_empty() {
                    println!("{}", annotation);
                }
                for header in report.header.rows() {
                    let cells: Vec<&str> = header.iter().map(|c| c.text()).collect();
                    println!("{}", cells.join("\t"));
                }
                for row in report.render_rows() {
                    println!("{}", row.join("\t"));
                }
                if let Some(annotation) = &report.filter_annotation {
                    println!("{}", annotation);
                }
            }
            ViewResult::Chart(chart) => print!("{}", chart),
        }
    }
}

fn print_menu(items: &[MenuItem], depth: usize) {
    for item in items {
        println!("{}{} {}", "  ".repeat(depth), item.title, item.link);
        print_menu(&item.sub_menu, depth + 1);
    }
}

fn print_help() {
    println!(
        r#"条件行:   add | remove #n | clear | show | fields [关键字]
          field #n <字段键> | role #n metric|group|filter
          op #n like|=|!=|>|<|>=|<= | text #n <值> | range #n [最小]..[最大]
          check #n <选项>,... | uncheck #n <选项>,... | toggle #n <选项> | flag #n on|off
查询状态: fixed <字段> [值] | sort [字段] [asc|desc] | page <n> | perpage <n>
          template [名称] | stat [统计时间] | title [报表名称] | chart <分组> <指标>
          columns <列>,...
视图:     view table|report|chart | params | search | export
其他:     import <文件> [年份] | menu | reset | help | quit
多条命令可用分号分隔，例如: add; field #1 age; range #1 6..12; search"#
    );
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::load_or_default(&cli.config)?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    init_tracing(&config.log_level);
    info!(config = %cli.config.display(), base_url = %config.base_url, "加载配置");

    let registry = Arc::new(config.load_registry()?);
    let client = Client::new(HttpTransport::new(&config.base_url, config.timeout())?);
    let mut shell = Shell::new(registry, &config, cli.view);

    if let Some(line) = cli.exec {
        shell.run_line(&client, &line);
        return Ok(());
    }

    println!("--- 学生视力档案: 组合查询 ---");
    println!("后端地址: {}，输入 help 查看命令", config.base_url);

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline(&shell.prompt()) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                editor.add_history_entry(line.as_str())?;
                if shell.run_line(&client, &line) == Flow::Quit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
