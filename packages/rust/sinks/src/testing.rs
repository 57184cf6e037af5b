//! Fixtures shared by the sink tests.

use leadpipe_shared::{
    ConversationMessage, LeadAssessment, LeadContext, LeadRecord, Priority, RawLead,
};

pub(crate) fn sample_lead() -> (LeadRecord, LeadAssessment) {
    let mut raw = RawLead::new("Ada Lovelace", "ada@acme-group.com");
    raw.phone = Some("+971 50 000 0000".into());
    raw.conversation_history = (0..7)
        .map(|i| {
            if i % 2 == 0 {
                ConversationMessage::user(format!("question {i} about real estate"))
            } else {
                ConversationMessage::bot(format!("answer {i}"))
            }
        })
        .collect();
    raw.context = LeadContext {
        session_id: Some("session_42".into()),
        user_agent: Some("Mozilla/5.0".into()),
        referrer: None,
        page_url: Some("https://example.com/contact".into()),
    };

    let assessment = LeadAssessment {
        score: 90,
        priority: Priority::High,
        tags: vec!["web-lead".into(), "real-estate-interest".into()],
    };
    (LeadRecord::from_raw(raw), assessment)
}
