//! Canonical document records and their display formatting.

use chrono::NaiveDate;
use uuid::Uuid;

/// Authoritative passage record as stored in the relational store.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub title: Option<String>,
    pub document_type: Option<String>,
    pub collection: Option<String>,
    pub sub_collection: Option<String>,
    pub acte_uniforme: Option<String>,
    pub livre: Option<String>,
    pub titre: Option<String>,
    pub partie: Option<i32>,
    pub chapitre: Option<i32>,
    pub section: Option<i32>,
    pub sous_section: Option<String>,
    pub article: Option<String>,
    pub alinea: Option<String>,
    pub tags: Option<String>,
    pub status: Option<String>,
    pub version: Option<i32>,
    pub date_publication: Option<NaiveDate>,
    pub date_revision: Option<NaiveDate>,
    pub is_latest: bool,
}

impl DocumentRecord {
    /// Display-ready collection path, e.g.
    /// `Actes Uniformes > Droit Commercial Général`.
    pub fn collection_display(&self) -> String {
        let parts: Vec<&str> = [self.collection.as_deref(), self.sub_collection.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        parts.join(" > ")
    }

    /// Display-ready legal hierarchy path, e.g.
    /// `Partie 2 > Chapitre 5 > Section 1 > Article 25`.
    pub fn hierarchy_display(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(acte) = &self.acte_uniforme {
            parts.push(acte.clone());
        }
        if let Some(livre) = &self.livre {
            parts.push(format!("Livre {livre}"));
        }
        if let Some(titre) = &self.titre {
            parts.push(format!("Titre {titre}"));
        }
        if let Some(partie) = self.partie {
            parts.push(format!("Partie {partie}"));
        }
        if let Some(chapitre) = self.chapitre {
            parts.push(format!("Chapitre {chapitre}"));
        }
        if let Some(section) = self.section {
            parts.push(format!("Section {section}"));
        }
        if let Some(sous_section) = &self.sous_section {
            parts.push(format!("Sous-section {sous_section}"));
        }
        if let Some(article) = &self.article {
            parts.push(format!("Article {article}"));
        }

        parts.join(" > ")
    }

    /// Collection path plus the main hierarchy coordinates.
    pub fn full_hierarchy_display(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(collection) = &self.collection {
            parts.push(collection.clone());
        }
        if let Some(sub) = &self.sub_collection {
            parts.push(sub.clone());
        }
        if let Some(partie) = self.partie {
            parts.push(format!("Partie {partie}"));
        }
        if let Some(chapitre) = self.chapitre {
            parts.push(format!("Chapitre {chapitre}"));
        }
        if let Some(section) = self.section {
            parts.push(format!("Section {section}"));
        }
        if let Some(article) = &self.article {
            parts.push(format!("Article {article}"));
        }

        if parts.is_empty() {
            "Document OHADA".to_string()
        } else {
            parts.join(" > ")
        }
    }

    /// Standard citation string, most specific coordinate first, e.g.
    /// `Article 25, Section 2, Chapitre 5, Partie 2, SYSCOHADA Révisé, 2017`.
    pub fn citation(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(article) = &self.article {
            parts.push(format!("Article {article}"));
        }
        if let Some(section) = self.section {
            let mut section_str = format!("Section {section}");
            if let Some(sous_section) = &self.sous_section {
                section_str.push_str(&format!(" Sous-section {sous_section}"));
            }
            parts.push(section_str);
        }
        if let Some(chapitre) = self.chapitre {
            parts.push(format!("Chapitre {chapitre}"));
        }
        if let Some(partie) = self.partie {
            parts.push(format!("Partie {partie}"));
        }
        if let Some(acte) = &self.acte_uniforme {
            parts.push(acte.clone());
        }
        if let Some(revision) = self.date_revision {
            use chrono::Datelike;
            parts.push(format!("SYSCOHADA Révisé, {}", revision.year()));
        }

        if parts.is_empty() {
            self.title.clone().unwrap_or_default()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DocumentRecord {
        DocumentRecord {
            id: Uuid::nil(),
            title: Some("Amortissements".to_string()),
            document_type: Some("article".to_string()),
            collection: Some("Actes Uniformes".to_string()),
            sub_collection: Some("Droit Comptable".to_string()),
            acte_uniforme: None,
            livre: None,
            titre: None,
            partie: Some(2),
            chapitre: Some(5),
            section: Some(1),
            sous_section: None,
            article: Some("25".to_string()),
            alinea: None,
            tags: None,
            status: Some("published".to_string()),
            version: Some(1),
            date_publication: None,
            date_revision: NaiveDate::from_ymd_opt(2017, 1, 26),
            is_latest: true,
        }
    }

    #[test]
    fn test_collection_display() {
        assert_eq!(
            record().collection_display(),
            "Actes Uniformes > Droit Comptable"
        );
    }

    #[test]
    fn test_hierarchy_display() {
        assert_eq!(
            record().hierarchy_display(),
            "Partie 2 > Chapitre 5 > Section 1 > Article 25"
        );
    }

    #[test]
    fn test_citation_most_specific_first() {
        assert_eq!(
            record().citation(),
            "Article 25, Section 1, Chapitre 5, Partie 2, SYSCOHADA Révisé, 2017"
        );
    }

    #[test]
    fn test_citation_labels_sous_section() {
        let mut r = record();
        r.sous_section = Some("2".to_string());
        // Section and sous-section must stay distinguishable from a plain
        // "Section 12".
        assert_eq!(
            r.citation(),
            "Article 25, Section 1 Sous-section 2, Chapitre 5, Partie 2, SYSCOHADA Révisé, 2017"
        );
    }

    #[test]
    fn test_citation_falls_back_to_title() {
        let mut r = record();
        r.article = None;
        r.section = None;
        r.chapitre = None;
        r.partie = None;
        r.date_revision = None;
        assert_eq!(r.citation(), "Amortissements");
    }

    #[test]
    fn test_full_hierarchy_display_empty_fallback() {
        let r = DocumentRecord {
            id: Uuid::nil(),
            title: None,
            document_type: None,
            collection: None,
            sub_collection: None,
            acte_uniforme: None,
            livre: None,
            titre: None,
            partie: None,
            chapitre: None,
            section: None,
            sous_section: None,
            article: None,
            alinea: None,
            tags: None,
            status: None,
            version: None,
            date_publication: None,
            date_revision: None,
            is_latest: true,
        };
        assert_eq!(r.full_hierarchy_display(), "Document OHADA");
    }
}
