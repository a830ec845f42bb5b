//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Blueprint, ChapterDetail, GradingResult, Quiz, QuizMode, SavedMaterial, SessionScore,
    SessionSummary,
};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    ListMaterials,
    SaveMaterial {
        text: String,
        #[serde(default)]
        name: Option<String>,
    },
    DeleteMaterial {
        id: String,
    },
    GenerateQuiz {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "sourceText")]
        source_text: String,
        mode: QuizMode,
        count: u32,
    },
    SubmitAnswer {
        #[serde(rename = "sessionId")]
        session_id: String,
        answer: AnswerIn,
    },
    Advance {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Restart {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Summary {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Materials {
        materials: Vec<SavedMaterial>,
    },
    MaterialSaved {
        material: SavedMaterial,
    },
    MaterialDeleted {
        id: String,
        deleted: bool,
    },
    Quiz {
        #[serde(rename = "sessionId")]
        session_id: String,
        quiz: Quiz,
        #[serde(rename = "remainingToday")]
        remaining_today: Option<u32>,
    },
    Answer {
        result: AnswerOut,
    },
    Advanced {
        result: AdvanceOut,
    },
    Restarted {
        session: SessionStateOut,
    },
    Summary {
        summary: SessionSummary,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveMaterialIn {
    pub text: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct MaterialsOut {
    pub materials: Vec<SavedMaterial>,
}

#[derive(Serialize)]
pub struct MaterialDeletedOut {
    pub id: String,
    pub deleted: bool,
}

/// File upload as a JSON envelope: bytes arrive base64-encoded alongside the
/// declared name and MIME type.
#[derive(Debug, Deserialize)]
pub struct IngestIn {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(rename = "dataBase64")]
    pub data_base64: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOut {
    pub material: SavedMaterial,
    pub text_len: usize,
}

#[derive(Debug, Deserialize)]
pub struct QuizIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "sourceText")]
    pub source_text: String,
    pub mode: QuizMode,
    pub count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOut {
    pub session_id: String,
    pub quiz: Quiz,
    /// None for pro users (unlimited).
    pub remaining_today: Option<u32>,
}

/// One answer submission. The kind must match the session's quiz mode.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerIn {
    Choice {
        #[serde(rename = "questionIdx")]
        question_idx: usize,
        #[serde(rename = "optionIdx")]
        option_idx: usize,
    },
    Gap {
        #[serde(rename = "questionIdx")]
        question_idx: usize,
        text: String,
    },
    TheoryTyped {
        #[serde(rename = "questionIdx")]
        question_idx: usize,
        text: String,
    },
    TheoryImage {
        #[serde(rename = "questionIdx")]
        question_idx: usize,
        #[serde(rename = "imageBase64")]
        image_base64: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerOut {
    Recorded {
        score: SessionScore,
        explanation: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        grading: Option<GradingResult>,
    },
    /// Nothing recorded: the grader saw no handwriting and one retry was
    /// consumed. The question is open for another attempt.
    RetryHandwriting {
        #[serde(rename = "retriesLeft")]
        retries_left: u8,
        grading: GradingResult,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AdvanceOut {
    Next {
        #[serde(rename = "questionIdx")]
        question_idx: usize,
    },
    Complete {
        summary: SessionSummary,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStateOut {
    pub session_id: String,
    pub phase: &'static str,
    pub question_idx: usize,
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct BlueprintIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "sourceText")]
    pub source_text: String,
}

#[derive(Serialize)]
pub struct BlueprintOut {
    pub blueprint: Blueprint,
}

#[derive(Debug, Deserialize)]
pub struct ChapterDetailsIn {
    #[serde(rename = "sourceText")]
    pub source_text: String,
    pub chapters: Vec<String>,
}

/// One entry per requested chapter, in request order; None where that
/// chapter's detail call failed.
#[derive(Serialize)]
pub struct ChapterDetailsOut {
    pub chapters: Vec<Option<ChapterDetail>>,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}
