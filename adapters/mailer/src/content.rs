//! Message content shared by both backends: subject, HTML body and the CSV
//! record attached by the SMTP backend.

use domain::Contact;

use crate::error::MailerError;

pub const CSV_HEADER: [&str; 6] = ["ID", "Nom", "Email", "Phone", "Formation", "Message"];

/// CSV file attached to a notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Transient notification built from a stored contact at send time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: CsvAttachment,
}

impl ContactEmail {
    pub fn for_contact(contact: &Contact, to: String) -> Result<Self, MailerError> {
        Ok(Self {
            to,
            subject: subject(contact),
            html_body: html_body(contact),
            attachment: CsvAttachment {
                filename: format!("contact_{}.csv", contact.id),
                content: contact_csv(contact)?,
            },
        })
    }
}

pub fn subject(contact: &Contact) -> String {
    format!("Nouveau contact: {}", contact.nom)
}

/// Header row plus one data row, quoted only where needed.
pub fn contact_csv(contact: &Contact) -> Result<Vec<u8>, MailerError> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)
        .map_err(|e| MailerError::Csv(e.to_string()))?;
    let id = contact.id.to_string();
    wtr.write_record([
        id.as_str(),
        contact.nom.as_str(),
        contact.email.as_str(),
        contact.phone.as_str(),
        contact.formation.as_str(),
        contact.message.as_str(),
    ])
    .map_err(|e| MailerError::Csv(e.to_string()))?;
    wtr.into_inner().map_err(|e| MailerError::Csv(e.to_string()))
}

pub fn html_body(contact: &Contact) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; padding: 20px;">
  <h2 style="color: #f97316;">Nouveau contact reçu</h2>
  <div style="background: #f8f9fa; padding: 15px; border-radius: 5px;">
    <p><strong>Nom :</strong> {nom}</p>
    <p><strong>Email :</strong> {email}</p>
    <p><strong>Téléphone :</strong> {phone}</p>
    <p><strong>Formation :</strong> {formation}</p>
    <p><strong>Message :</strong></p>
    <p>{message}</p>
  </div>
  <p><em>Référence #{id}</em></p>
</div>"#,
        nom = html_escape(&contact.nom),
        email = html_escape(&contact.email),
        phone = html_escape(&contact.phone),
        formation = html_escape(&contact.formation),
        message = html_escape(&contact.message).replace('\n', "<br>"),
        id = contact.id,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ContactId, NewContact};

    fn contact() -> Contact {
        Contact::stored(
            ContactId::new(42).unwrap(),
            NewContact {
                nom: "Awa".into(),
                email: "awa@example.com".into(),
                phone: "0707".into(),
                formation: "SEO, SEA".into(),
                message: "Il a dit \"bonjour\"\nà demain".into(),
            },
        )
    }

    #[test]
    fn csv_has_header_and_one_quoted_row() {
        let csv = String::from_utf8(contact_csv(&contact()).unwrap()).unwrap();
        let expected = "ID,Nom,Email,Phone,Formation,Message\n\
                        42,Awa,awa@example.com,0707,\"SEO, SEA\",\"Il a dit \"\"bonjour\"\"\nà demain\"\n";
        assert_eq!(csv, expected);
    }

    #[test]
    fn email_names_attachment_after_id() {
        let email = ContactEmail::for_contact(&contact(), "admin@example.com".into()).unwrap();
        assert_eq!(email.attachment.filename, "contact_42.csv");
        assert_eq!(email.subject, "Nouveau contact: Awa");
        assert_eq!(email.to, "admin@example.com");
    }

    #[test]
    fn html_escapes_user_input() {
        let mut c = contact();
        c.nom = "<script>alert('x')</script>".into();
        let html = html_body(&c);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"));
        assert!(html.contains("bonjour&quot;<br>à demain"));
    }
}
