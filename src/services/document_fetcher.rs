use std::{path::Path, sync::Arc, time::Duration};

use reqwest::{cookie::Jar, header::REFERER, Url};

use crate::error::ScoutError;

use super::{Browser, BrowserError};

/// What the out-of-band request borrows from the live browser session.
#[derive(Debug, Clone, Default)]
pub struct SessionCredentials {
    pub cookies: Vec<(String, String)>,
    pub user_agent: String,
    pub referer: String,
}

impl SessionCredentials {
    pub async fn capture(browser: &dyn Browser) -> Result<Self, BrowserError> {
        Ok(SessionCredentials {
            cookies: browser.cookies().await?,
            user_agent: browser.user_agent().await?,
            referer: browser.current_url().await?,
        })
    }
}

/// Retrieves filing documents over HTTP with the browser's session.
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    base_url: String,
    timeout: Duration,
}

impl DocumentFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        DocumentFetcher {
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn document_url(&self, filing_number: &str) -> Result<Url, ScoutError> {
        Ok(Url::parse_with_params(
            &self.base_url,
            &[("filingNo", filing_number)],
        )?)
    }

    /// Writes the response body to `dest`. `Ok(false)` on a non-success
    /// status; whether the body is a usable document is for the caller to check.
    pub async fn fetch(
        &self,
        credentials: &SessionCredentials,
        filing_number: &str,
        dest: &Path,
    ) -> Result<bool, ScoutError> {
        let url = self.document_url(filing_number)?;

        let jar = Jar::default();
        for (name, value) in &credentials.cookies {
            jar.add_cookie_str(&format!("{}={}", name, value), &url);
        }

        let mut builder = reqwest::Client::builder()
            .cookie_provider(Arc::new(jar))
            .timeout(self.timeout);
        if !credentials.user_agent.is_empty() {
            builder = builder.user_agent(credentials.user_agent.clone());
        }
        let client = builder.build()?;

        let mut request = client.get(url);
        if !credentials.referer.is_empty() {
            request = request.header(REFERER, credentials.referer.as_str());
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            log::warn!(
                "Document request for filing {} returned {}",
                filing_number,
                response.status()
            );
            return Ok(false);
        }

        let body = response.bytes().await?;
        std::fs::write(dest, &body)?;
        log::debug!(
            "Fetched {} bytes for filing {} into {}",
            body.len(),
            filing_number,
            dest.display()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::{DocumentFetcher, SessionCredentials};

    /// Answers one request with `status` and `body`, handing back what it received.
    async fn serve_once(status: &'static str, body: &'static [u8]) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/Common/DownloadFileByNumber", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (base, handle)
    }

    fn credentials() -> SessionCredentials {
        SessionCredentials {
            cookies: vec![("ASP.NET_SessionId".to_string(), "abc123".to_string())],
            user_agent: "FakeAgent/1.0".to_string(),
            referer: "https://ccfs.sos.wa.gov/#/BusinessInformation".to_string(),
        }
    }

    #[test]
    fn document_url_encodes_filing_number() {
        let fetcher = DocumentFetcher::new(
            "https://ccfs.sos.wa.gov/Common/DownloadFileByNumber",
            Duration::from_secs(90),
        );
        let url = fetcher.document_url("2024 0101").unwrap();
        assert_eq!(
            url.as_str(),
            "https://ccfs.sos.wa.gov/Common/DownloadFileByNumber?filingNo=2024+0101"
        );
    }

    #[tokio::test]
    async fn fetch_replays_session_and_writes_body() {
        let (base, server) = serve_once("200 OK", b"%PDF-1.4 body").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("202401010001.pdf");

        let fetched = DocumentFetcher::new(base, Duration::from_secs(5))
            .fetch(&credentials(), "202401010001", &dest)
            .await
            .unwrap();

        assert!(fetched);
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4 body");
        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /common/downloadfilebynumber?filingno=202401010001"));
        assert!(request.contains("cookie: asp.net_sessionid=abc123"));
        assert!(request.contains("user-agent: fakeagent/1.0"));
        assert!(request.contains("referer: https://ccfs.sos.wa.gov/#/businessinformation"));
    }

    #[tokio::test]
    async fn fetch_reports_error_status() {
        let (base, _server) = serve_once("404 Not Found", b"").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.pdf");

        let fetched = DocumentFetcher::new(base, Duration::from_secs(5))
            .fetch(&credentials(), "1", &dest)
            .await
            .unwrap();

        assert!(!fetched);
        assert!(!dest.exists());
    }
}
