//! Ttl cache of dns answers

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use hickory_resolver::proto::{
    op::{Message, ResponseCode},
    rr::{DNSClass, LowerName, RData, Record, RecordType},
};
use tokio::time::Instant;

use crate::{transport::message_id, ExchangeResult, ProtocolError};

/// Upper bound of any cached ttl, one day.
pub const MAX_TTL: u32 = 86400;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: LowerName,
    query_type: RecordType,
    query_class: DNSClass,
}

impl CacheKey {
    /// Key of the first question of a wire format query.
    pub fn from_query(query: &[u8]) -> Option<Self> {
        let message = Message::from_vec(query).ok()?;
        let question = message.queries().first()?;
        Some(Self {
            name: LowerName::from(question.name()),
            query_type: question.query_type(),
            query_class: question.query_class(),
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.query_class, self.query_type)
    }
}

#[derive(Debug)]
pub struct CacheEntry {
    message: Message,
    stored_at: Instant,
    valid_until: Instant,
}

impl CacheEntry {
    /// Returns `None` for answers that must not be cached.
    fn new(answer: &[u8], now: Instant, negative_ttl: Duration) -> Option<Self> {
        let message = Message::from_vec(answer).ok()?;
        if message.truncated() {
            return None;
        }

        let ttl = match message.response_code() {
            ResponseCode::NoError if !message.answers().is_empty() => {
                message.answers().iter().map(Record::ttl).min()?
            }
            ResponseCode::NoError | ResponseCode::NXDomain => negative_ttl_of(&message)
                .unwrap_or_else(|| u32::try_from(negative_ttl.as_secs()).unwrap_or(MAX_TTL)),
            _ => return None,
        }
        .min(MAX_TTL);

        if ttl == 0 {
            return None;
        }

        Some(Self {
            message,
            stored_at: now,
            valid_until: now + Duration::from_secs(u64::from(ttl)),
        })
    }

    pub fn is_current(&self, now: Instant) -> bool {
        now < self.valid_until
    }

    pub fn ttl(&self, now: Instant) -> Duration {
        self.valid_until.saturating_duration_since(now)
    }

    /// Wire format answer for query `id`, ttls decremented by the time spent
    /// in the cache.
    fn answer(&self, id: u16, now: Instant) -> Result<Vec<u8>, ProtocolError> {
        let elapsed = u32::try_from(now.saturating_duration_since(self.stored_at).as_secs())
            .unwrap_or(u32::MAX);
        let age = |mut records: Vec<Record>| {
            for record in records.iter_mut() {
                let ttl = record.ttl().saturating_sub(elapsed);
                record.set_ttl(ttl);
            }
            records
        };

        let mut message = self.message.clone();
        message.set_id(id);
        let answers = age(message.take_answers());
        message.insert_answers(answers);
        let name_servers = age(message.take_name_servers());
        message.insert_name_servers(name_servers);
        let additionals = age(message.take_additionals());
        message.insert_additionals(additionals);

        Ok(message.to_vec()?)
    }
}

/// Negative caching ttl from the SOA of the authority section (RFC 2308).
fn negative_ttl_of(message: &Message) -> Option<u32> {
    message
        .name_servers()
        .iter()
        .find_map(|record| match record.data() {
            Some(RData::SOA(soa)) => Some(record.ttl().min(soa.minimum())),
            _ => None,
        })
}

/// Answers keyed by question, evicted lazily once their ttl ran out.
#[derive(Debug)]
pub struct TtlCache {
    entries: Mutex<HashMap<CacheKey, Arc<CacheEntry>>>,
    negative_ttl: Duration,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl TtlCache {
    pub fn new(negative_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            negative_ttl,
        }
    }

    /// Answers `query` from the cache, or awaits `exchange` and stores its
    /// answer. `exchange` is not polled on a hit. Failed exchanges are not
    /// stored.
    pub async fn lookup<F>(&self, query: &[u8], exchange: F) -> ExchangeResult<Vec<u8>>
    where
        F: Future<Output = ExchangeResult<Vec<u8>>>,
    {
        let Some(key) = CacheKey::from_query(query) else {
            return exchange.await;
        };

        let now = Instant::now();
        if let Some(entry) = self.get(&key, now) {
            log::debug!("cache hit {} ttl {:?}", key, entry.ttl(now));
            return Ok(entry.answer(message_id(query), now)?);
        }

        let answer = exchange.await?;
        let now = Instant::now();
        if let Some(entry) = CacheEntry::new(&answer, now, self.negative_ttl) {
            log::debug!("cache store {} ttl {:?}", key, entry.ttl(now));
            self.insert(key, entry);
        }

        Ok(answer)
    }

    fn get(&self, key: &CacheKey, now: Instant) -> Option<Arc<CacheEntry>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.is_current(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: CacheKey, entry: CacheEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, Arc::new(entry));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
