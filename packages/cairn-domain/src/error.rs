pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
	#[error("Embedding has {actual} dimensions, expected {expected}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Embedding contains a non-finite value at index {index}.")]
	NonFiniteComponent { index: usize },
	#[error("Embedding has zero magnitude.")]
	ZeroMagnitude,
	#[error("{field} must be non-empty.")]
	EmptyField { field: &'static str },
	#[error("Unknown seniority level: {value}.")]
	UnknownSeniority { value: String },
	#[error("{kind} belongs to organization {actual}, expected {expected}.")]
	CrossOrgReference { kind: &'static str, expected: uuid::Uuid, actual: uuid::Uuid },
	#[error("Unknown {kind} value: {value}.")]
	UnknownStatus { kind: &'static str, value: String },
}
