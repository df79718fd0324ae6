mod http;
mod interface;
mod types;

pub use http::ZoomIpClient;
pub use interface::IpListSource;
pub use types::{diff, is_valid_entry, parse_ip_list, IpListSnapshot, ListDiff};
