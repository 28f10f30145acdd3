use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("invalid {field} address {input:?}")]
    InvalidAddress { field: &'static str, input: String },
    #[error("device {0} is not loaded")]
    DeviceNotLoaded(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvisorError {
    #[error("device {0} is not loaded")]
    DeviceNotLoaded(String),
    #[error("policy {policy_id} not found on device {device_id}")]
    PolicyMissing { device_id: String, policy_id: u32 },
}
