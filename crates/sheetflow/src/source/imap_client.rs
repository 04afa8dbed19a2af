//! IMAP mailbox connector. Authenticates with XOAUTH2 over TLS and exposes
//! message attachments as `<folder>/<uid>/<filename>` paths.

use super::mailbox::{MailboxConnector, MailboxEntry, MailboxFileSystem};
use crate::error::{Error, Result};
use chrono::{NaiveDate, Utc};
use imap::types::Fetch;
use mailparse::{DispositionType, ParsedMail};
use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const IMAPS_PORT: u16 = 993;
const DEFAULT_FOLDER: &str = "INBOX";

type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// SASL XOAUTH2 initial response.
struct XOAuth2<'a> {
    user: &'a str,
    access_token: &'a str,
}

impl imap::Authenticator for XOAuth2<'_> {
    type Response = String;

    fn process(&self, _challenge: &[u8]) -> Self::Response {
        xoauth2_response(self.user, self.access_token)
    }
}

fn xoauth2_response(user: &str, access_token: &str) -> String {
    format!("user={}\x01auth=Bearer {}\x01\x01", user, access_token)
}

/// Connects to `imaps://host:993`.
#[derive(Debug, Default)]
pub struct ImapConnector;

impl MailboxConnector for ImapConnector {
    fn connect(
        &self,
        host: &str,
        username: &str,
        access_token: &str,
    ) -> Result<Arc<dyn MailboxFileSystem>> {
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| Error::backend("imap", e))?;
        let client =
            imap::connect((host, IMAPS_PORT), host, &tls).map_err(|e| Error::backend("imap", e))?;

        let auth = XOAuth2 {
            user: username,
            access_token,
        };
        let session = client
            .authenticate("XOAUTH2", &auth)
            .map_err(|(e, _client)| Error::backend("imap", e))?;
        info!(host = %host, user = %username, "Authenticated mailbox session");

        Ok(Arc::new(ImapMailbox {
            session: Mutex::new(session),
        }))
    }
}

/// One authenticated session; IMAP commands are serialized through it.
pub struct ImapMailbox {
    session: Mutex<ImapSession>,
}

impl ImapMailbox {
    fn with_session<T>(&self, f: impl FnOnce(&mut ImapSession) -> imap::Result<T>) -> Result<T> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::backend("imap", "mailbox session lock poisoned"))?;
        f(&mut *session).map_err(|e| Error::backend("imap", e))
    }
}

impl MailboxFileSystem for ImapMailbox {
    fn ls(&self, folder: &str, since: Option<NaiveDate>) -> Result<Vec<MailboxEntry>> {
        let folder = folder_name(folder);
        let query = search_query(since);
        debug!(folder = %folder, query = %query, "Searching mailbox");

        let messages = self.with_session(|session| {
            session.select(&folder)?;
            let mut uids: Vec<u32> = session.uid_search(&query)?.into_iter().collect();
            if uids.is_empty() {
                return Ok(Vec::new());
            }
            uids.sort_unstable();
            let fetched = session.uid_fetch(uid_set(&uids), "(UID INTERNALDATE BODY.PEEK[])")?;
            Ok(fetched.iter().filter_map(FetchedMessage::from_fetch).collect())
        })?;

        let mut entries = Vec::new();
        for message in messages {
            let mail = match mailparse::parse_mail(&message.body) {
                Ok(mail) => mail,
                Err(e) => {
                    debug!(uid = message.uid, error = %e, "Skipping unparseable message");
                    continue;
                }
            };
            for name in attachment_names(&mail) {
                entries.push(MailboxEntry {
                    name: format!("{}/{}/{}", folder, message.uid, name),
                    last_modified: message.internal_date,
                });
            }
        }
        Ok(entries)
    }

    fn open(&self, path: &str) -> Result<Vec<u8>> {
        let (folder, uid, name) = split_path(path)?;
        let messages = self.with_session(|session| {
            session.select(folder)?;
            let fetched = session.uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")?;
            Ok(fetched.iter().filter_map(FetchedMessage::from_fetch).collect::<Vec<_>>())
        })?;

        let message = messages
            .into_iter()
            .next()
            .ok_or_else(|| Error::backend("imap", format!("message {} not found", path)))?;
        let mail = mailparse::parse_mail(&message.body).map_err(|e| Error::backend("imap", e))?;
        attachment_body(&mail, name)?
            .ok_or_else(|| Error::backend("imap", format!("attachment {} not found", path)))
    }
}

/// Owned copy of the parts of a FETCH response we keep.
struct FetchedMessage {
    uid: u32,
    internal_date: Option<chrono::DateTime<Utc>>,
    body: Vec<u8>,
}

impl FetchedMessage {
    fn from_fetch(fetch: &Fetch) -> Option<Self> {
        Some(Self {
            uid: fetch.uid?,
            internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
            body: fetch.body()?.to_vec(),
        })
    }
}

fn folder_name(path: &str) -> String {
    match path.trim_matches('/') {
        "" => DEFAULT_FOLDER.to_string(),
        folder => folder.to_string(),
    }
}

/// IMAP SEARCH criteria; SINCE takes a date like `30-Apr-2023`.
fn search_query(since: Option<NaiveDate>) -> String {
    match since {
        Some(date) => format!("SINCE {}", date.format("%d-%b-%Y")),
        None => "ALL".to_string(),
    }
}

fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Split `<folder>/<uid>/<filename>`; the folder may itself contain `/`.
fn split_path(path: &str) -> Result<(&str, u32, &str)> {
    let mut parts = path.rsplitn(3, '/');
    let (Some(name), Some(uid), Some(folder)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::Config(format!("Not a mailbox attachment path: {}", path)));
    };
    let uid = uid
        .parse()
        .map_err(|_| Error::Config(format!("Not a mailbox attachment path: {}", path)))?;
    Ok((folder, uid, name))
}

/// File name of a part sent as an attachment, with `/` replaced.
fn attachment_name(part: &ParsedMail<'_>) -> Option<String> {
    let disposition = part.get_content_disposition();
    if disposition.disposition != DispositionType::Attachment {
        return None;
    }
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| name.replace('/', "_"))
}

fn attachment_names(mail: &ParsedMail<'_>) -> Vec<String> {
    let mut names: Vec<String> = attachment_name(mail).into_iter().collect();
    for part in &mail.subparts {
        names.extend(attachment_names(part));
    }
    names
}

fn attachment_body(mail: &ParsedMail<'_>, name: &str) -> Result<Option<Vec<u8>>> {
    if attachment_name(mail).as_deref() == Some(name) {
        return mail
            .get_body_raw()
            .map(Some)
            .map_err(|e| Error::backend("imap", e));
    }
    for part in &mail.subparts {
        if let Some(body) = attachment_body(part, name)? {
            return Ok(Some(body));
        }
    }
    Ok(None)
}
