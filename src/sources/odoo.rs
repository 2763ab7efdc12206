//! Live ledger access over Odoo-style JSON-RPC
//!
//! Only read calls are issued: `common.authenticate` once on connect and
//! `object.execute_kw` with `search_read` afterwards. Every failure surfaces
//! as [`CloseError::Connection`] carrying a [`RpcFailure`] label.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::error::Error as _;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::OdooSettings;
use crate::period::Period;
use crate::tax::vat::TaxType;
use crate::traits::*;
use crate::types::*;
use crate::utils::money::{amount_from_json, sum_round2};

const MOVE_LINE_LIMIT: u32 = 200;
const BALANCE_PAGE_SIZE: u32 = 2000;

const CONTROL_ASSUMPTION: &str = "Live mode: VAT control balance approximated from posted tax move lines (opening = balance before period, debits/credits = movements in period).";

/// Why a call to the ledger failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcFailure {
    Dns,
    Timeout,
    ConnectionRefused,
    Tls,
    Protocol,
    Authentication,
    Permission,
    MissingDatabase,
}

impl RpcFailure {
    pub fn label(&self) -> &'static str {
        match self {
            RpcFailure::Dns => "DNS resolution failed",
            RpcFailure::Timeout => "request timed out",
            RpcFailure::ConnectionRefused => "connection refused or reset",
            RpcFailure::Tls => "TLS handshake failed",
            RpcFailure::Protocol => "HTTP/protocol fault",
            RpcFailure::Authentication => "authentication failed",
            RpcFailure::Permission => "permission denied",
            RpcFailure::MissingDatabase => "database not found",
        }
    }

    fn into_error(self, detail: impl fmt::Display) -> CloseError {
        CloseError::Connection(format!("{}: {detail}", self.label()))
    }
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a transport error from its flags and its source chain text
fn transport_failure(timeout: bool, connect: bool, detail: &str) -> RpcFailure {
    let detail = detail.to_lowercase();
    if timeout || detail.contains("timed out") {
        RpcFailure::Timeout
    } else if detail.contains("dns") || detail.contains("resolve") || detail.contains("lookup") {
        RpcFailure::Dns
    } else if detail.contains("certificate") || detail.contains("tls") || detail.contains("handshake") {
        RpcFailure::Tls
    } else if connect
        || detail.contains("refused")
        || detail.contains("reset")
        || detail.contains("connection error")
        || detail.contains("connection closed")
    {
        RpcFailure::ConnectionRefused
    } else {
        RpcFailure::Protocol
    }
}

fn classify_transport(err: &reqwest::Error) -> CloseError {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    transport_failure(err.is_timeout(), err.is_connect(), &chain).into_error(chain)
}

/// Classify a JSON-RPC error object returned by the server
fn fault_failure(error: &Value) -> RpcFailure {
    let name = error["data"]["name"].as_str().unwrap_or_default();
    let message = format!(
        "{} {}",
        error["message"].as_str().unwrap_or_default(),
        error["data"]["message"].as_str().unwrap_or_default()
    )
    .to_lowercase();

    if name.contains("AccessDenied") {
        RpcFailure::Authentication
    } else if name.contains("AccessError") {
        RpcFailure::Permission
    } else if message.contains("database")
        && (message.contains("does not exist") || message.contains("not found"))
    {
        RpcFailure::MissingDatabase
    } else {
        RpcFailure::Protocol
    }
}

fn fault_detail(error: &Value) -> String {
    error["data"]["message"]
        .as_str()
        .or_else(|| error["message"].as_str())
        .unwrap_or("unknown fault")
        .to_string()
}

/// Authenticated JSON-RPC session
pub struct OdooClient {
    http: reqwest::Client,
    endpoint: String,
    settings: OdooSettings,
    uid: i64,
    request_id: AtomicU64,
}

impl OdooClient {
    /// Open a session; fails when the credentials are rejected
    pub async fn connect(settings: OdooSettings) -> CloseResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| RpcFailure::Protocol.into_error(e))?;
        let endpoint = format!("{}/jsonrpc", settings.url.trim_end_matches('/'));

        let mut client = Self {
            http,
            endpoint,
            settings,
            uid: 0,
            request_id: AtomicU64::new(1),
        };

        let result = client
            .call(
                "common",
                "authenticate",
                json!([
                    client.settings.database,
                    client.settings.username,
                    client.settings.password,
                    {}
                ]),
            )
            .await?;
        client.uid = result.as_i64().ok_or_else(|| {
            RpcFailure::Authentication.into_error(format!(
                "user {:?} rejected by database {:?}",
                client.settings.username, client.settings.database
            ))
        })?;

        tracing::info!(url = %client.settings.url, db = %client.settings.database, uid = client.uid, "connected to ledger");
        Ok(client)
    }

    async fn call(&self, service: &str, method: &str, args: Value) -> CloseResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {"service": service, "method": method, "args": args},
            "id": id,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcFailure::Protocol.into_error(format!("HTTP {status} from {}", self.endpoint)));
        }

        let mut payload: Value = response.json().await.map_err(|e| classify_transport(&e))?;
        if let Some(error) = payload.get("error") {
            let failure = fault_failure(error);
            tracing::warn!(service, method, %failure, "ledger call failed");
            return Err(failure.into_error(fault_detail(error)));
        }
        Ok(payload
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// `search_read` on a model, returning raw records
    pub async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        order: Option<&str>,
        limit: Option<u32>,
    ) -> CloseResult<Vec<Value>> {
        self.search_read_page(model, &domain, fields, order, limit, None)
            .await
    }

    /// `search_read` every matching record, fetching `page_size` rows at a time
    /// until a short page comes back
    pub async fn search_read_all(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        order: &str,
        page_size: u32,
    ) -> CloseResult<Vec<Value>> {
        let page_size = page_size.max(1);
        let mut rows = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = self
                .search_read_page(model, &domain, fields, Some(order), Some(page_size), Some(offset))
                .await?;
            let fetched = page.len();
            tracing::debug!(model, offset, fetched, "fetched page");
            rows.extend(page);
            if fetched < page_size as usize {
                return Ok(rows);
            }
            offset = offset.saturating_add(page_size);
        }
    }

    async fn search_read_page(
        &self,
        model: &str,
        domain: &Value,
        fields: &[&str],
        order: Option<&str>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> CloseResult<Vec<Value>> {
        let mut kwargs = json!({ "fields": fields });
        if let Some(order) = order {
            kwargs["order"] = json!(order);
        }
        if let Some(limit) = limit {
            kwargs["limit"] = json!(limit);
        }
        if let Some(offset) = offset {
            kwargs["offset"] = json!(offset);
        }

        let result = self
            .call(
                "object",
                "execute_kw",
                json!([
                    self.settings.database,
                    self.uid,
                    self.settings.password,
                    model,
                    "search_read",
                    [domain],
                    kwargs
                ]),
            )
            .await?;

        match result {
            Value::Array(rows) => Ok(rows),
            other => Err(RpcFailure::Protocol
                .into_error(format!("search_read on {model} returned {other}"))),
        }
    }
}

/// String field; the ledger sends `false` for empty values
fn text(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

fn many2one_id(value: &Value) -> Option<i64> {
    value.as_array().and_then(|pair| pair.first()).and_then(Value::as_i64)
}

fn many2one_name(value: &Value) -> String {
    value
        .as_array()
        .and_then(|pair| pair.get(1))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn date_field(value: &Value) -> Option<NaiveDate> {
    value
        .as_str()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn amount(value: &Value) -> CloseResult<BigDecimal> {
    match value {
        Value::Bool(false) => Ok(BigDecimal::from(0)),
        other => amount_from_json(other).map_err(CloseError::Data),
    }
}

fn period_domain(period: Period) -> [Value; 2] {
    [
        json!(["date", ">=", period.start().to_string()]),
        json!(["date", "<", period.end_exclusive().to_string()]),
    ]
}

/// Source adapter reading a live ledger through [`OdooClient`]
pub struct OdooSource {
    client: OdooClient,
}

impl OdooSource {
    pub fn new(client: OdooClient) -> Self {
        Self { client }
    }

    pub async fn connect(settings: OdooSettings) -> CloseResult<Self> {
        Ok(Self::new(OdooClient::connect(settings).await?))
    }

    /// Number of move lines on the entry a statement line produced
    async fn move_line_count(&self, move_id: i64) -> CloseResult<u32> {
        let lines = self
            .client
            .search_read(
                "account.move.line",
                json!([["move_id", "=", move_id]]),
                &["id"],
                None,
                Some(MOVE_LINE_LIMIT),
            )
            .await?;
        Ok(lines.len() as u32)
    }

    async fn moves_by_id(&self, ids: Vec<i64>) -> CloseResult<HashMap<i64, Value>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let moves = self
            .client
            .search_read(
                "account.move",
                json!([["id", "in", ids]]),
                &["id", "name", "ref", "move_type", "invoice_date", "date"],
                None,
                None,
            )
            .await?;
        Ok(moves
            .into_iter()
            .filter_map(|row| row["id"].as_i64().map(|id| (id, row)))
            .collect())
    }

    async fn sum_tax_lines(&self, domain: Value, field: &str) -> CloseResult<BigDecimal> {
        let rows = self
            .client
            .search_read("account.move.line", domain, &[field], None, None)
            .await?;
        let amounts = rows
            .iter()
            .map(|row| amount(&row[field]))
            .collect::<CloseResult<Vec<_>>>()?;
        Ok(sum_round2(amounts.iter()))
    }
}

#[async_trait]
impl SourceAdapter for OdooSource {
    async fn discover_bank_journals(&self) -> CloseResult<Vec<BankJournal>> {
        let rows = self
            .client
            .search_read(
                "account.journal",
                json!([["active", "=", true], ["type", "in", ["bank", "cash"]]]),
                &["id", "name", "type", "currency_id"],
                Some("name asc"),
                None,
            )
            .await?;

        rows.iter()
            .map(|row| {
                let id = row["id"]
                    .as_i64()
                    .ok_or_else(|| CloseError::Data(format!("journal without id: {row}")))?;
                Ok(BankJournal {
                    id,
                    name: text(&row["name"]),
                    journal_type: match row["type"].as_str() {
                        Some("cash") => JournalType::Cash,
                        _ => JournalType::Bank,
                    },
                    currency: many2one_name(&row["currency_id"]),
                    active: true,
                    code: id.to_string(),
                })
            })
            .collect()
    }

    async fn get_statement_lines(
        &self,
        journal: &BankJournal,
        period: Period,
    ) -> CloseResult<Vec<StatementLine>> {
        let [from, to] = period_domain(period);
        let rows = self
            .client
            .search_read(
                "account.bank.statement.line",
                json!([["journal_id", "=", journal.id], from, to]),
                &["id", "date", "amount", "payment_ref", "ref", "is_reconciled", "move_id"],
                Some("date asc,id asc"),
                None,
            )
            .await?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            let move_line_count = match many2one_id(&row["move_id"]) {
                Some(move_id) => self.move_line_count(move_id).await?,
                None => 0,
            };
            let payment_ref = text(&row["payment_ref"]);
            let reference = if payment_ref.is_empty() {
                text(&row["ref"])
            } else {
                payment_ref.clone()
            };
            lines.push(StatementLine {
                id: row["id"].to_string(),
                date: date_field(&row["date"]),
                amount: amount(&row["amount"])?,
                reference,
                payment_ref,
                is_reconciled: row["is_reconciled"].as_bool().unwrap_or(false),
                move_line_count,
            });
        }
        Ok(lines)
    }

    async fn get_journal_balance(
        &self,
        journal: &BankJournal,
        period: Period,
    ) -> CloseResult<BigDecimal> {
        let [from, to] = period_domain(period);
        let rows = self
            .client
            .search_read_all(
                "account.move.line",
                json!([
                    ["journal_id", "=", journal.id],
                    from,
                    to,
                    ["parent_state", "=", "posted"]
                ]),
                &["balance"],
                "id asc",
                BALANCE_PAGE_SIZE,
            )
            .await?;

        let balances = rows
            .iter()
            .map(|row| amount(&row["balance"]))
            .collect::<CloseResult<Vec<_>>>()?;
        Ok(balances.iter().sum())
    }

    async fn get_vat_tax_lines(
        &self,
        period: Period,
        tax_type: TaxType,
    ) -> CloseResult<Vec<TaxLine>> {
        let tax_use = match tax_type {
            TaxType::Input => "purchase",
            TaxType::Output => "sale",
        };
        let [from, to] = period_domain(period);
        let rows = self
            .client
            .search_read(
                "account.move.line",
                json!([
                    ["tax_line_id.type_tax_use", "=", tax_use],
                    ["parent_state", "=", "posted"],
                    from,
                    to
                ]),
                &["id", "balance", "move_id", "tax_line_id"],
                Some("date asc,id asc"),
                None,
            )
            .await?;

        let mut move_ids: Vec<i64> = rows.iter().filter_map(|r| many2one_id(&r["move_id"])).collect();
        move_ids.sort_unstable();
        move_ids.dedup();
        let moves = self.moves_by_id(move_ids).await?;

        let empty = Value::Null;
        rows.iter()
            .map(|row| {
                let owner = many2one_id(&row["move_id"])
                    .and_then(|id| moves.get(&id))
                    .unwrap_or(&empty);
                let move_ref = text(&owner["ref"]);
                let document_ref = if move_ref.is_empty() {
                    text(&owner["name"])
                } else {
                    move_ref
                };
                let source_period = date_field(&owner["invoice_date"])
                    .map(|d| Period::of_date(d).to_string())
                    .unwrap_or_default();

                Ok(TaxLine {
                    period,
                    tax_type,
                    vat_amount: amount(&row["balance"])?.abs(),
                    document_ref,
                    move_type: text(&owner["move_type"]),
                    source_period,
                    exception_hint: String::new(),
                    notes: many2one_name(&row["tax_line_id"]),
                })
            })
            .collect()
    }

    async fn get_vat_control_balance(&self, period: Period) -> CloseResult<VatControlBalance> {
        let posted_tax = || {
            vec![
                json!(["tax_line_id", "!=", false]),
                json!(["parent_state", "=", "posted"]),
            ]
        };

        let mut before = posted_tax();
        before.push(json!(["date", "<", period.start().to_string()]));
        let opening = self.sum_tax_lines(Value::Array(before), "balance").await?;

        let mut within = posted_tax();
        within.extend(period_domain(period));
        let within = Value::Array(within);
        let debits = self.sum_tax_lines(within.clone(), "debit").await?;
        let credits = self.sum_tax_lines(within, "credit").await?;

        Ok(VatControlBalance::from_movements(
            opening,
            debits,
            credits,
            CONTROL_ASSUMPTION,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_request(socket: &mut TcpStream) -> Value {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return Value::Null;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = head_end + 4;
            if buf.len() >= body_start + length {
                return serde_json::from_slice(&buf[body_start..body_start + length]).unwrap();
            }
        }
    }

    /// Local JSON-RPC ledger that authenticates as uid 7 and holds `rows`
    /// move lines of balance 1.0, honouring `limit` and `offset`
    async fn serve_ledger(rows: usize) -> (String, Arc<AtomicU64>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let pages = Arc::new(AtomicU64::new(0));
        let counter = pages.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let params = &request["params"];
                    let result = if params["service"] == "common" {
                        json!(7)
                    } else {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let kwargs = &params["args"][6];
                        let offset = kwargs["offset"].as_u64().unwrap_or(0) as usize;
                        let limit = kwargs["limit"].as_u64().map_or(rows, |l| l as usize);
                        let end = rows.min(offset + limit);
                        let start = offset.min(end);
                        Value::Array(
                            (start..end)
                                .map(|i| json!({"id": i + 1, "balance": 1.0}))
                                .collect(),
                        )
                    };
                    let body = json!({"jsonrpc": "2.0", "id": request["id"], "result": result}).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                });
            }
        });
        (url, pages)
    }

    #[test]
    fn test_fault_classification() {
        let denied = json!({"message": "Odoo Server Error", "data": {"name": "odoo.exceptions.AccessDenied", "message": "Access Denied"}});
        assert_eq!(fault_failure(&denied), RpcFailure::Authentication);

        let acl = json!({"message": "Odoo Server Error", "data": {"name": "odoo.exceptions.AccessError", "message": "not allowed to read account.move"}});
        assert_eq!(fault_failure(&acl), RpcFailure::Permission);

        let db = json!({"message": "Odoo Server Error", "data": {"name": "psycopg2.OperationalError", "message": "FATAL: database \"prod\" does not exist"}});
        assert_eq!(fault_failure(&db), RpcFailure::MissingDatabase);

        let other = json!({"message": "Odoo Server Error", "data": {"name": "builtins.ValueError", "message": "Invalid field"}});
        assert_eq!(fault_failure(&other), RpcFailure::Protocol);
        assert_eq!(fault_detail(&other), "Invalid field");
    }

    #[test]
    fn test_transport_classification() {
        assert_eq!(transport_failure(true, false, "operation timed out"), RpcFailure::Timeout);
        assert_eq!(
            transport_failure(false, true, "error trying to connect: dns error: failed to lookup address"),
            RpcFailure::Dns
        );
        assert_eq!(
            transport_failure(false, true, "error trying to connect: invalid peer certificate"),
            RpcFailure::Tls
        );
        assert_eq!(
            transport_failure(false, true, "tcp connect error: Connection refused (os error 111)"),
            RpcFailure::ConnectionRefused
        );
        assert_eq!(
            transport_failure(
                false,
                false,
                "error sending request: connection error: Connection reset by peer (os error 104)"
            ),
            RpcFailure::ConnectionRefused
        );
        assert_eq!(
            transport_failure(false, false, "error sending request: connection closed before message completed"),
            RpcFailure::ConnectionRefused
        );
        assert_eq!(transport_failure(false, false, "error decoding response body"), RpcFailure::Protocol);
    }

    #[test]
    fn test_failure_maps_to_connection_error() {
        let err = RpcFailure::Permission.into_error("not allowed");
        match err {
            CloseError::Connection(msg) => assert_eq!(msg, "permission denied: not allowed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_field_helpers() {
        assert_eq!(text(&json!(false)), "");
        assert_eq!(text(&json!("BNK1/2025/0001")), "BNK1/2025/0001");
        assert_eq!(many2one_id(&json!([7, "USD"])), Some(7));
        assert_eq!(many2one_name(&json!([7, "USD"])), "USD");
        assert_eq!(many2one_name(&json!(false)), "");
        assert_eq!(date_field(&json!("2025-01-31")), NaiveDate::from_ymd_opt(2025, 1, 31));
        assert_eq!(date_field(&json!(false)), None);
        assert_eq!(amount(&json!(false)).unwrap(), BigDecimal::from(0));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let settings = OdooSettings {
            url: "http://127.0.0.1:9".to_string(),
            database: "prod".to_string(),
            username: "finance".to_string(),
            password: "secret".to_string(),
            timeout: std::time::Duration::from_secs(2),
        };
        let result = OdooClient::connect(settings).await;
        assert!(matches!(result, Err(CloseError::Connection(_))));
    }

    #[tokio::test]
    async fn test_journal_balance_reads_every_page() {
        let (url, pages) = serve_ledger(5203).await;
        let source = OdooSource::connect(OdooSettings {
            url,
            database: "prod".to_string(),
            username: "finance".to_string(),
            password: "secret".to_string(),
            timeout: std::time::Duration::from_secs(5),
        })
        .await
        .unwrap();

        let journal = BankJournal {
            id: 3,
            name: "Main Bank".to_string(),
            journal_type: JournalType::Bank,
            currency: String::new(),
            active: true,
            code: "main_bank".to_string(),
        };
        let period = "2025-01".parse::<Period>().unwrap();
        let balance = source.get_journal_balance(&journal, period).await.unwrap();

        assert_eq!(balance, BigDecimal::from(5203));
        assert_eq!(pages.load(Ordering::Relaxed), 3);
    }
}
