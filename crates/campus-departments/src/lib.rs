//! The department agents behind the routers, plus in-memory backends for
//! the record-store and knowledge-index boundaries.

/// Academic affairs agents.
pub mod academic;
/// Finance agents.
pub mod finance;
/// IT support agents.
pub mod it;
/// Library agents.
pub mod library;
/// In-memory backend implementations.
pub mod memory;
/// Student affairs agents.
pub mod student_affairs;
mod support;

use std::sync::Arc;

use campus_a2a::{AgentRegistry, InvocationTarget};
use campus_core::{AgentCard, Department, KnowledgeIndex, RecordStore, TaskType};

pub use academic::AcademicStatusAgent;
pub use finance::{ScholarshipAgent, TuitionAgent};
pub use it::PasswordResetAgent;
pub use library::LibraryAgent;
pub use memory::{InMemoryRecordStore, StaticKnowledgeIndex};
pub use student_affairs::{CampusInfoAgent, CourseRegistrationAgent};

/// Registers every department sub-agent with its card and skills.
///
/// Routers are wired separately by whoever bootstraps the process, since
/// they need the shared invoker.
pub fn register_department_agents(
    registry: &Arc<AgentRegistry>,
    records: Arc<dyn RecordStore>,
    knowledge: Arc<dyn KnowledgeIndex>,
) {
    registry.register(
        AgentCard::new(
            TuitionAgent::AGENT_ID,
            "Tuition Agent",
            Some(Department::Finance),
            vec![TaskType::CheckFeeStatus, TaskType::CheckPaymentStatus],
        )
        .with_description("Tuition balance and payment history lookups"),
        InvocationTarget::Local(Arc::new(TuitionAgent::new(records.clone()))),
    );
    registry.register(
        AgentCard::new(
            ScholarshipAgent::AGENT_ID,
            "Scholarship Agent",
            Some(Department::Finance),
            vec![TaskType::CheckScholarship],
        )
        .with_description("Scholarship eligibility checks"),
        InvocationTarget::Local(Arc::new(ScholarshipAgent::new(records.clone()))),
    );
    registry.register(
        AgentCard::new(
            AcademicStatusAgent::AGENT_ID,
            "Academic Status Agent",
            Some(Department::AcademicAffairs),
            vec![TaskType::CheckAcademicStatus],
        )
        .with_description("GPA and standing lookups"),
        InvocationTarget::Local(Arc::new(AcademicStatusAgent::new(records.clone()))),
    );
    registry.register(
        AgentCard::new(
            CourseRegistrationAgent::AGENT_ID,
            "Course Registration Agent",
            Some(Department::StudentAffairs),
            vec![TaskType::CheckCourseRegistration],
        )
        .with_description("Registration eligibility combining fee and academic checks"),
        InvocationTarget::Local(Arc::new(CourseRegistrationAgent::new(records.clone()))),
    );
    registry.register(
        AgentCard::new(
            CampusInfoAgent::AGENT_ID,
            "Campus Info Agent",
            Some(Department::StudentAffairs),
            vec![TaskType::GeneralQuery],
        )
        .with_description("Handbook-backed answers to general questions"),
        InvocationTarget::Local(Arc::new(CampusInfoAgent::new(knowledge.clone()))),
    );
    registry.register(
        AgentCard::new(
            PasswordResetAgent::AGENT_ID,
            "Password Reset Agent",
            Some(Department::It),
            vec![TaskType::PasswordReset],
        )
        .with_description("Account password resets"),
        InvocationTarget::Local(Arc::new(PasswordResetAgent::new(records.clone()))),
    );
    registry.register(
        AgentCard::new(
            LibraryAgent::AGENT_ID,
            "Library Agent",
            Some(Department::Library),
            vec![TaskType::SearchBook, TaskType::CheckLibraryCard],
        )
        .with_description("Catalogue search and card status"),
        InvocationTarget::Local(Arc::new(LibraryAgent::new(records, knowledge))),
    );
}
