//! HTTP fetch collaborator: lists the weeks available on
//! `https://planet.openstreetmap.org/tile_logs/` and fetches and
//! decompresses one day's log at a time.

use crate::iso_week::{IsoWeek, parse_day};
use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{BufRead, Cursor, Read};
use std::time::Duration;
use tilerank_core::Error;
use tilerank_pipeline::DayFetcher;
use xz2::read::XzDecoder;

pub const BASE_URL: &str = "https://planet.openstreetmap.org/tile_logs/";

lazy_static! {
	static ref LISTING_ENTRY: Regex = Regex::new(r#"<a href="tiles-(\d{4}-\d\d-\d\d)\.txt\.xz">"#).unwrap();
}

/// Fetches per-day tile logs and the directory listing over HTTP.
pub struct HttpFetcher {
	client: reqwest::Client,
}

impl HttpFetcher {
	pub fn new() -> Result<HttpFetcher> {
		let client = reqwest::Client::builder()
			.tcp_keepalive(Duration::from_secs(600))
			.use_rustls_tls()
			.build()
			.context("building HTTP client")?;
		Ok(HttpFetcher { client })
	}

	/// Lists every ISO week for which all seven UTC dates' logs are present
	/// in the directory listing, sorted chronologically. A week with fewer
	/// than seven days listed is not yet complete and is dropped.
	pub async fn list_available_weeks(&self) -> Result<Vec<IsoWeek>> {
		let response = self.client.get(BASE_URL).send().await.with_context(|| format!("fetching {BASE_URL}"))?;
		let content_type = content_type_without_charset(&response);
		if response.status().as_u16() != 200 || content_type != "text/html" {
			return Err(Error::fetch(format!(
				"failed to fetch {BASE_URL}, StatusCode={} Content-Type={}",
				response.status().as_u16(),
				content_type
			)));
		}
		let body = response.text().await.with_context(|| format!("reading body of {BASE_URL}"))?;
		parse_listing(&body)
	}
}

#[async_trait]
impl DayFetcher for HttpFetcher {
	/// Fetches and xz-decompresses `tiles-<day>.txt.xz`. Checks the status
	/// explicitly before decompression: a 404 or 5xx is a fetch failure, not
	/// an empty day.
	async fn fetch(&self, day: &str) -> Result<Box<dyn BufRead + Send>> {
		let url = format!("{BASE_URL}tiles-{day}.txt.xz");
		let response = self.client.get(&url).send().await.with_context(|| format!("fetching {url}"))?;
		let content_type = content_type_without_charset(&response);
		if response.status().as_u16() >= 400 {
			return Err(Error::fetch(format!(
				"failed to fetch {url}, StatusCode={} Content-Type={}",
				response.status().as_u16(),
				content_type
			)));
		}
		let bytes = response.bytes().await.with_context(|| format!("reading body of {url}"))?;
		let mut decoder = XzDecoder::new(Cursor::new(bytes));
		let mut text = Vec::new();
		decoder.read_to_end(&mut text).with_context(|| format!("decompressing {url}"))?;
		Ok(Box::new(Cursor::new(text)))
	}
}

fn content_type_without_charset(response: &reqwest::Response) -> String {
	response
		.headers()
		.get(reqwest::header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
		.unwrap_or_default()
}

fn parse_listing(body: &str) -> Result<Vec<IsoWeek>> {
	let mut by_week: BTreeMap<IsoWeek, u8> = BTreeMap::new();
	for caps in LISTING_ENTRY.captures_iter(body) {
		let date = parse_day(&caps[1])?;
		*by_week.entry(IsoWeek::containing(date)).or_insert(0) += 1;
	}
	Ok(by_week.into_iter().filter(|&(_, count)| count == 7).map(|(week, _)| week).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_listing_keeps_only_fully_present_weeks() {
		let mut body = String::new();
		// 2024-01-01 (Mon) .. 2024-01-07 (Sun) is a complete ISO week 2024-W01.
		for day in ["01", "02", "03", "04", "05", "06", "07"] {
			body.push_str(&format!(r#"<a href="tiles-2024-01-{day}.txt.xz">tiles-2024-01-{day}.txt.xz</a>\n"#));
		}
		// Only 3 of 7 days for the following week: must be dropped.
		for day in ["08", "09", "10"] {
			body.push_str(&format!(r#"<a href="tiles-2024-01-{day}.txt.xz">tiles-2024-01-{day}.txt.xz</a>\n"#));
		}
		let weeks = parse_listing(&body).unwrap();
		assert_eq!(weeks, vec![IsoWeek { year: 2024, week: 1 }]);
	}

	#[test]
	fn parse_listing_ignores_unrelated_anchors() {
		let body = r#"<a href="other.html">other</a><a href="tiles-2024-01-01.txt.xz">x</a>"#;
		let weeks = parse_listing(body).unwrap();
		assert!(weeks.is_empty());
	}
}
