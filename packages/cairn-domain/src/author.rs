use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Seniority {
	Intern,
	Junior,
	Mid,
	Senior,
	Lead,
	Executive,
}
impl Seniority {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Intern => "intern",
			Self::Junior => "junior",
			Self::Mid => "mid",
			Self::Senior => "senior",
			Self::Lead => "lead",
			Self::Executive => "executive",
		}
	}

	pub fn parse(value: &str) -> Result<Self> {
		match value.trim().to_ascii_lowercase().as_str() {
			"intern" => Ok(Self::Intern),
			"junior" => Ok(Self::Junior),
			"mid" => Ok(Self::Mid),
			"senior" => Ok(Self::Senior),
			"lead" => Ok(Self::Lead),
			"executive" => Ok(Self::Executive),
			_ => Err(Error::UnknownSeniority { value: value.to_string() }),
		}
	}

	fn label(self) -> &'static str {
		match self {
			Self::Intern => "Intern",
			Self::Junior => "Junior",
			Self::Mid => "Mid-level",
			Self::Senior => "Senior",
			Self::Lead => "Lead",
			Self::Executive => "Executive",
		}
	}
}

/// Who wrote a note. The relevance scorer grades content against this profile.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AuthorContext {
	pub job_title: String,
	pub department: String,
	pub seniority: Seniority,
}
impl AuthorContext {
	/// Trims text fields and rejects empty ones.
	pub fn normalized(self) -> Result<Self> {
		let job_title = self.job_title.trim().to_string();
		let department = self.department.trim().to_string();

		if job_title.is_empty() {
			return Err(Error::EmptyField { field: "author_context.job_title" });
		}
		if department.is_empty() {
			return Err(Error::EmptyField { field: "author_context.department" });
		}

		Ok(Self { job_title, department, seniority: self.seniority })
	}

	/// Human-readable label shown next to evidence, e.g. "Senior Product Manager, Product".
	pub fn descriptor(&self) -> String {
		format!("{} {}, {}", self.seniority.label(), self.job_title, self.department)
	}
}
