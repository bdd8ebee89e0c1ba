//! Read view of a song submission, as exposed by the submission catalogue.

use bigdecimal::BigDecimal;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRef {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    /// Major units, as configured by the curator.
    pub submission_fee: BigDecimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongRef {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub status: String,
    pub playlist: PlaylistRef,
    pub song: SongRef,
}

impl Submission {
    /// Line shown to the payer on the provider's checkout page.
    pub fn payment_description(&self) -> String {
        format!(
            "Submission of \"{}\" to playlist \"{}\"",
            self.song.title, self.playlist.name
        )
    }
}
