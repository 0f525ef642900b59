use serde::{Deserialize, Serialize};

use crate::domain::{ClientId, TalkId};

/// Create request body: a talk before the backend has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTalk {
    pub name: String,
    pub description: String,
    pub speaker_name: String,
    pub speaker_bio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
}

impl NewTalk {
    /// Name of the first required field that is empty, if any.
    pub fn first_empty_field(&self) -> Option<&'static str> {
        [
            ("name", &self.name),
            ("description", &self.description),
            ("speakerName", &self.speaker_name),
            ("speakerBio", &self.speaker_bio),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
    }

    pub fn into_talk(self, id: Option<TalkId>) -> Talk {
        Talk {
            id,
            name: self.name,
            description: self.description,
            speaker_name: self.speaker_name,
            speaker_bio: self.speaker_bio,
            client_id: self.client_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Talk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TalkId>,
    pub name: String,
    pub description: String,
    pub speaker_name: String,
    pub speaker_bio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
}

impl Talk {
    /// Inserted locally and not yet confirmed by the backend.
    pub fn is_pending(&self) -> bool {
        self.id.is_none()
    }

    pub fn to_new_talk(&self) -> NewTalk {
        NewTalk {
            name: self.name.clone(),
            description: self.description.clone(),
            speaker_name: self.speaker_name.clone(),
            speaker_bio: self.speaker_bio.clone(),
            client_id: self.client_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    TalkCreated { talk: Talk },
    TalkDeleted { id: TalkId },
}
