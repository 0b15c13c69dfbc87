//! 网络地址校验
//!
//! 地址格式：`<protocol>://<IPv4 或主机名>:<4-5 位端口>`，例如
//! `tcp://10.10.1.26:8080`、`http://xbl-daq-34:9901`。
//! 主机名至少包含一个既不是数字也不是 `.` 的字符，用来和 IP 区分。

use std::net::Ipv4Addr;
use std::sync::OnceLock;

use regex::Regex;

/// 地址协议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// 数据流（ZeroMQ）
    Tcp,
    /// 控制 API
    Http,
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Http => "http",
        }
    }
}

/// 拆分后的地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAddress {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

fn address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<scheme>[a-z]+)://(?P<host>[\w.\-]+):(?P<port>[0-9]{4,5})/?$")
            .expect("address pattern is a valid regex")
    })
}

fn is_dotted_quad(host: &str) -> bool {
    host.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// 解析并校验地址，失败时返回原因
pub fn parse_address(address: &str, protocol: Protocol) -> Result<NetworkAddress, String> {
    let caps = address_regex().captures(address.trim()).ok_or_else(|| {
        format!(
            "'{}' is not of the form {}://<host>:<port> (4-5 digit port)",
            address,
            protocol.scheme()
        )
    })?;

    let scheme = &caps["scheme"];
    if scheme != protocol.scheme() {
        return Err(format!(
            "'{}' uses protocol '{}', expected '{}'",
            address,
            scheme,
            protocol.scheme()
        ));
    }

    let host = &caps["host"];
    if is_dotted_quad(host) {
        host.parse::<Ipv4Addr>()
            .map_err(|_| format!("'{}' is not a valid IPv4 address", host))?;
    }

    let port = caps["port"]
        .parse::<u16>()
        .map_err(|_| format!("port in '{}' is out of range", address))?;

    Ok(NetworkAddress {
        protocol,
        host: host.to_string(),
        port,
    })
}

/// 地址中的端口号（已校验的地址才有意义）
pub fn port_of(address: &str) -> Option<u16> {
    address_regex()
        .captures(address.trim())
        .and_then(|caps| caps["port"].parse().ok())
}
