use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    /// Faculty accounts are recognised by their address, same as the web login.
    pub fn for_email(email: &str) -> Self {
        if email.to_ascii_lowercase().contains("professor") {
            Role::Teacher
        } else {
            Role::Student
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudentIdentity {
    pub reg_no: String,
    pub name: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub teacher_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeacherIdentity {
    pub teacher_id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Identity {
    Student(StudentIdentity),
    Teacher(TeacherIdentity),
}

impl Identity {
    pub fn role(&self) -> Role {
        match self {
            Identity::Student(_) => Role::Student,
            Identity::Teacher(_) => Role::Teacher,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Identity::Student(student) => &student.name,
            Identity::Teacher(teacher) => &teacher.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_faculty_by_email() {
        assert_eq!(Role::for_email("Professor.rao@manipal.edu"), Role::Teacher);
        assert_eq!(Role::for_email("student1@manipal.edu"), Role::Student);
    }

    #[test]
    fn login_payload_deserializes_by_role() {
        let raw = r#"{"message": "Login successful", "role": "student", "reg_no": "230905001",
            "name": "Asha", "section": "A1", "branch": "CSE", "teacher_id": "T01"}"#;
        let identity: Identity = serde_json::from_str(raw).unwrap();
        assert_eq!(identity.role(), Role::Student);
        assert_eq!(identity.display_name(), "Asha");
    }
}
