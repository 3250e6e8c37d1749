//! Interactive administration console.
//!
//! # Responsibilities
//! - Read commands from stdin until it closes or shutdown fires
//! - Mutate the blocklist and inspect the cache and counters
//!
//! # Design Decisions
//! - `execute` is pure with respect to I/O; the loop prints what it returns
//! - End of stdin stops the console only, never the proxy
//! - Stdin is read on a plain OS thread that is never joined. A blocking read
//!   parked in the runtime's blocking pool would hold process exit until the
//!   operator pressed Enter.

use std::fmt::Write as _;
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::SystemTime;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

use crate::admin::commands::AdminCommand;
use crate::cache::ResponseCache;
use crate::observability::ProxyStats;
use crate::security::AccessControl;

const HELP: &str = "\
Commands:
  block <host>     Block a host
  unblock <host>   Unblock a host
  list blocked     Show all blocked hosts
  list cache       Show all cached URLs and sizes
  purge cache      Remove expired cache entries now
  stats            Show request and cache statistics
  help             Show this message
";

const PROMPT: &[u8] = b"> ";

/// Console bound to the proxy's shared state.
#[derive(Debug, Clone)]
pub struct Console {
    access: AccessControl,
    cache: ResponseCache,
    stats: Arc<ProxyStats>,
}

impl Console {
    pub fn new(access: AccessControl, cache: ResponseCache, stats: Arc<ProxyStats>) -> Self {
        Self {
            access,
            cache,
            stats,
        }
    }

    /// Run one command and return the text to show.
    pub fn execute(&self, command: &AdminCommand) -> String {
        match command {
            AdminCommand::Block(host) => {
                self.access.block(host.as_str());
                format!("Blocked: {}\n", host)
            }
            AdminCommand::Unblock(host) => {
                if self.access.unblock(host) {
                    format!("Unblocked: {}\n", host)
                } else {
                    format!("Host not in block list: {}\n", host)
                }
            }
            AdminCommand::ListBlocked => self.list_blocked(),
            AdminCommand::ListCache => self.list_cache(SystemTime::now()),
            AdminCommand::PurgeCache => {
                let removed = self.cache.purge_expired();
                format!("Purged {} expired entries ({} remaining)\n", removed, self.cache.len())
            }
            AdminCommand::Stats => self.stats(),
            AdminCommand::Help => HELP.to_string(),
            AdminCommand::Usage(usage) => format!("Usage: {}\n", usage),
            AdminCommand::Unknown(verb) => format!("Unknown command: {}  (type 'help')\n", verb),
        }
    }

    fn list_blocked(&self) -> String {
        let hosts = self.access.blocked_hosts();
        if hosts.is_empty() {
            return "No hosts are blocked.\n".to_string();
        }
        let mut out = String::from("Blocked hosts:\n");
        for host in hosts {
            let _ = writeln!(out, "  {}", host);
        }
        out
    }

    fn list_cache(&self, now: SystemTime) -> String {
        let entries = self.cache.snapshot();
        if entries.is_empty() {
            return "Cache is empty.\n".to_string();
        }
        let mut out = String::from("Cached URLs:\n");
        for (url, entry) in entries {
            let expiry = match entry.remaining_at(now) {
                Some(left) if left.as_secs() > 0 => format!("expires in {}s", left.as_secs()),
                _ => "EXPIRED".to_string(),
            };
            let _ = writeln!(out, "  {}  ({} bytes, {})", url, entry.body().len(), expiry);
        }
        out
    }

    fn stats(&self) -> String {
        let snap = self.stats.snapshot();
        let mut out = String::from("--- Proxy Stats ---\n");
        let _ = writeln!(out, "  Total requests : {}", snap.total_requests);
        let _ = writeln!(out, "  Cache hits     : {}", snap.cache_hits);
        let _ = writeln!(out, "  Cache misses   : {}", snap.cache_misses);
        let _ = writeln!(out, "  Blocked        : {}", snap.blocked);
        let _ = writeln!(out, "  Hit rate       : {:.1}%", snap.hit_rate());
        let _ = writeln!(out, "  Avg hit time   : {}ms", snap.avg_hit_ms());
        let _ = writeln!(out, "  Avg miss time  : {}ms", snap.avg_miss_ms());
        out
    }

    /// Serve stdin until it closes or shutdown is signalled.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        let (tx, rx) = mpsc::channel(16);
        let reader = thread::Builder::new()
            .name("console-stdin".into())
            .spawn(move || read_stdin(tx));
        if let Err(e) = reader {
            tracing::warn!(error = %e, "Could not start console reader");
            return;
        }
        self.run_with(rx, tokio::io::stdout(), shutdown).await;
    }

    /// Console loop over any line source and output.
    ///
    /// Returns when the line source closes or shutdown fires, whichever is first.
    pub async fn run_with<W>(
        self,
        mut lines: mpsc::Receiver<String>,
        mut out: W,
        mut shutdown: broadcast::Receiver<()>,
    ) where
        W: AsyncWrite + Unpin,
    {
        let _ = out.write_all(HELP.as_bytes()).await;
        let _ = out.write_all(PROMPT).await;
        let _ = out.flush().await;

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        tracing::info!("Console input closed");
                        break;
                    };
                    if let Some(command) = AdminCommand::parse(&line) {
                        let reply = self.execute(&command);
                        let _ = out.write_all(reply.as_bytes()).await;
                    }
                    let _ = out.write_all(PROMPT).await;
                    let _ = out.flush().await;
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}

/// Blocking stdin pump. Ends at EOF, on a read error, or once the console is gone.
fn read_stdin(tx: mpsc::Sender<String>) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Console read failed");
                return;
            }
        };
        if tx.blocking_send(line).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedEntry;
    use crate::observability::Outcome;
    use std::time::Duration;

    fn console() -> Console {
        Console::new(
            AccessControl::new(),
            ResponseCache::new(),
            Arc::new(ProxyStats::new()),
        )
    }

    fn entry(created: SystemTime, ttl_secs: u64, body: &[u8]) -> CachedEntry {
        CachedEntry::new(
            "HTTP/1.1 200 OK".into(),
            vec![],
            body.to_vec(),
            created,
            Duration::from_secs(ttl_secs),
        )
    }

    #[test]
    fn test_block_and_unblock() {
        let console = console();
        assert_eq!(
            console.execute(&AdminCommand::Block("ads.test".into())),
            "Blocked: ads.test\n"
        );
        assert!(console.access.is_blocked("ads.test"));

        assert_eq!(
            console.execute(&AdminCommand::Unblock("ads.test".into())),
            "Unblocked: ads.test\n"
        );
        assert_eq!(
            console.execute(&AdminCommand::Unblock("ads.test".into())),
            "Host not in block list: ads.test\n"
        );
    }

    #[test]
    fn test_list_blocked() {
        let console = console();
        assert_eq!(console.execute(&AdminCommand::ListBlocked), "No hosts are blocked.\n");

        console.access.block("b.test");
        console.access.block("a.test");
        assert_eq!(
            console.execute(&AdminCommand::ListBlocked),
            "Blocked hosts:\n  a.test\n  b.test\n"
        );
    }

    #[test]
    fn test_list_cache_marks_expired() {
        let console = console();
        assert_eq!(console.list_cache(SystemTime::now()), "Cache is empty.\n");

        let now = SystemTime::now();
        console.cache.store("http://fresh.test/", entry(now, 120, b"hello"));
        console
            .cache
            .store("http://old.test/", entry(now - Duration::from_secs(300), 60, b"x"));

        let out = console.list_cache(now);
        assert!(out.starts_with("Cached URLs:\n"));
        assert!(out.contains("  http://fresh.test/  (5 bytes, expires in 120s)\n"));
        assert!(out.contains("  http://old.test/  (1 bytes, EXPIRED)\n"));
    }

    #[test]
    fn test_purge_cache() {
        let console = console();
        let now = SystemTime::now();
        console.cache.store("http://fresh.test/", entry(now, 120, b""));
        console
            .cache
            .store("http://old.test/", entry(now - Duration::from_secs(300), 60, b""));

        assert_eq!(
            console.execute(&AdminCommand::PurgeCache),
            "Purged 1 expired entries (1 remaining)\n"
        );
    }

    #[test]
    fn test_stats_report() {
        let console = console();
        console.stats.record(Outcome::Hit, Duration::from_millis(10));
        console.stats.record(Outcome::Miss, Duration::from_millis(50));
        console.stats.record(Outcome::Miss, Duration::from_millis(70));
        console.stats.record(Outcome::Blocked, Duration::from_millis(1));

        let out = console.execute(&AdminCommand::Stats);
        assert!(out.contains("Total requests : 4\n"));
        assert!(out.contains("Cache hits     : 1\n"));
        assert!(out.contains("Cache misses   : 2\n"));
        assert!(out.contains("Blocked        : 1\n"));
        assert!(out.contains("Hit rate       : 25.0%\n"));
        assert!(out.contains("Avg hit time   : 10ms\n"));
        assert!(out.contains("Avg miss time  : 60ms\n"));
    }

    #[tokio::test]
    async fn test_loop_runs_commands_until_input_closes() {
        let console = console();
        let access = console.access.clone();
        let (tx, rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send("block a.test".to_string()).await.unwrap();
        tx.send("".to_string()).await.unwrap();
        tx.send("list blocked".to_string()).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            console.run_with(rx, &mut out, shutdown_rx),
        )
        .await
        .expect("loop ended when input closed");

        let out = String::from_utf8(out).unwrap();
        let replies = out.strip_prefix(HELP).expect("help printed first");
        assert_eq!(replies, "> Blocked: a.test\n> > Blocked hosts:\n  a.test\n> ");
        assert!(access.is_blocked("a.test"));
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown_with_input_open() {
        let console = console();
        let (tx, rx) = mpsc::channel::<String>(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(console.run_with(rx, tokio::io::sink(), shutdown_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("loop ended on shutdown")
            .unwrap();
        assert!(tx.send("stats".to_string()).await.is_err());
    }

    #[test]
    fn test_usage_and_unknown_text() {
        let console = console();
        assert_eq!(
            console.execute(&AdminCommand::Usage("block <host>")),
            "Usage: block <host>\n"
        );
        assert_eq!(
            console.execute(&AdminCommand::Unknown("reload".into())),
            "Unknown command: reload  (type 'help')\n"
        );
        assert!(console.execute(&AdminCommand::Help).contains("purge cache"));
    }
}
