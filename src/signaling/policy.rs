use super::types::{SessionId, SignalingError};

/// Request allow-lists checked during the WebSocket handshake.
///
/// An empty list allows everything.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// Allowed request path prefixes
    pub paths: Vec<String>,
    /// Allowed `Host` header values
    pub hosts: Vec<String>,
    /// Allowed `Origin` header values
    pub origins: Vec<String>,
}

impl AccessPolicy {
    /// Check one upgrade request and return the session it addresses.
    pub fn admit(
        &self,
        path: &str,
        host: Option<&str>,
        origin: Option<&str>,
    ) -> Result<SessionId, SignalingError> {
        if !self.paths.is_empty() && !self.paths.iter().any(|p| path.starts_with(p.as_str())) {
            return Err(SignalingError::InvalidPath(path.to_string()));
        }
        if !allowed(&self.hosts, host) {
            return Err(SignalingError::Forbidden(format!(
                "host {}",
                host.unwrap_or("<none>")
            )));
        }
        if !allowed(&self.origins, origin) {
            return Err(SignalingError::Forbidden(format!(
                "origin {}",
                origin.unwrap_or("<none>")
            )));
        }
        SessionId::from_path(path)
    }
}

fn allowed(list: &[String], value: Option<&str>) -> bool {
    list.is_empty() || value.is_some_and(|v| list.iter().any(|item| item == v))
}
