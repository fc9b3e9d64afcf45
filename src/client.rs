//! Blocking client for the HTTP API
//!
//! Every call takes the `Session` it runs under; the client itself only holds
//! the connection pool.

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;

use crate::models::{
    CreateProcess, Instance, InstanceStats, ListInstances, Process, StartInstance,
    UpdateInstance, UpdateProcess, User,
};
use crate::session::Session;

#[derive(Debug)]
pub enum ClientError {
    /// Transport failure or undecodable response
    Http(reqwest::Error),
    /// The server answered with an error status
    Api { status: u16, message: String },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Http(err) => write!(f, "HTTP error: {}", err),
            ClientError::Api { status, message } => {
                write!(f, "Server returned {}: {}", status, message)
            }
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Http(err) => Some(err),
            ClientError::Api { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err)
    }
}

impl ClientError {
    /// HTTP status of an API error
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(err) => err.status().map(|s| s.as_u16()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct ProcessEnvelope {
    process: Process,
}

#[derive(Deserialize)]
struct ProcessesEnvelope {
    processes: Vec<Process>,
}

#[derive(Deserialize)]
struct InstanceEnvelope {
    instance: Instance,
}

#[derive(Deserialize)]
struct InstancesEnvelope {
    instances: Vec<Instance>,
}

#[derive(Deserialize)]
struct MessageEnvelope {
    message: String,
}

#[derive(Deserialize)]
struct StatsEnvelope {
    stats: InstanceStats,
}

pub struct ApiClient {
    http: Client,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send()?;
        Self::decode(response)
    }

    fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>()?);
        }
        let text = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or_else(|_| {
                if text.is_empty() {
                    status.to_string()
                } else {
                    text
                }
            });
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub fn me(&self, session: &Session) -> Result<User, ClientError> {
        let envelope: UserEnvelope = self.send(
            self.http
                .get(session.url("/me"))
                .bearer_auth(&session.token),
        )?;
        Ok(envelope.user)
    }

    pub fn list_processes(&self, session: &Session) -> Result<Vec<Process>, ClientError> {
        let envelope: ProcessesEnvelope = self.send(
            self.http
                .get(session.url("/processes"))
                .bearer_auth(&session.token),
        )?;
        Ok(envelope.processes)
    }

    pub fn get_process(&self, session: &Session, id: i64) -> Result<Process, ClientError> {
        let envelope: ProcessEnvelope = self.send(
            self.http
                .get(session.url(&format!("/processes/{}", id)))
                .bearer_auth(&session.token),
        )?;
        Ok(envelope.process)
    }

    pub fn create_process(
        &self,
        session: &Session,
        request: &CreateProcess,
    ) -> Result<Process, ClientError> {
        let envelope: ProcessEnvelope = self.send(
            self.http
                .post(session.url("/processes"))
                .bearer_auth(&session.token)
                .json(request),
        )?;
        Ok(envelope.process)
    }

    pub fn update_process(
        &self,
        session: &Session,
        id: i64,
        request: &UpdateProcess,
    ) -> Result<Process, ClientError> {
        let envelope: ProcessEnvelope = self.send(
            self.http
                .put(session.url(&format!("/processes/{}", id)))
                .bearer_auth(&session.token)
                .json(request),
        )?;
        Ok(envelope.process)
    }

    /// Deletes the process and, with it, every instance recorded against it
    pub fn delete_process(&self, session: &Session, id: i64) -> Result<String, ClientError> {
        let envelope: MessageEnvelope = self.send(
            self.http
                .delete(session.url(&format!("/processes/{}", id)))
                .bearer_auth(&session.token),
        )?;
        Ok(envelope.message)
    }

    pub fn list_instances(
        &self,
        session: &Session,
        filter: &ListInstances,
    ) -> Result<Vec<Instance>, ClientError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(process_id) = filter.process_id {
            query.push(("process_id", process_id.to_string()));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = filter.offset {
            query.push(("offset", offset.to_string()));
        }
        let envelope: InstancesEnvelope = self.send(
            self.http
                .get(session.url("/instances"))
                .query(&query)
                .bearer_auth(&session.token),
        )?;
        Ok(envelope.instances)
    }

    pub fn start_instance(
        &self,
        session: &Session,
        request: &StartInstance,
    ) -> Result<Instance, ClientError> {
        let envelope: InstanceEnvelope = self.send(
            self.http
                .post(session.url("/instances"))
                .bearer_auth(&session.token)
                .json(request),
        )?;
        Ok(envelope.instance)
    }

    pub fn update_instance(
        &self,
        session: &Session,
        id: i64,
        request: &UpdateInstance,
    ) -> Result<Instance, ClientError> {
        let envelope: InstanceEnvelope = self.send(
            self.http
                .put(session.url(&format!("/instances/{}", id)))
                .bearer_auth(&session.token)
                .json(request),
        )?;
        Ok(envelope.instance)
    }

    pub fn get_instance(&self, session: &Session, id: i64) -> Result<Instance, ClientError> {
        let envelope: InstanceEnvelope = self.send(
            self.http
                .get(session.url(&format!("/instances/{}", id)))
                .bearer_auth(&session.token),
        )?;
        Ok(envelope.instance)
    }

    pub fn delete_instance(&self, session: &Session, id: i64) -> Result<String, ClientError> {
        let envelope: MessageEnvelope = self.send(
            self.http
                .delete(session.url(&format!("/instances/{}", id)))
                .bearer_auth(&session.token),
        )?;
        Ok(envelope.message)
    }

    pub fn summary(&self, session: &Session) -> Result<InstanceStats, ClientError> {
        let envelope: StatsEnvelope = self.send(
            self.http
                .get(session.url("/instances/stats/summary"))
                .bearer_auth(&session.token),
        )?;
        Ok(envelope.stats)
    }
}
