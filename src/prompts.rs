//! Prompts for VLM-based certificate classification.
//!
//! Every prompt lives here so the wording can change without touching the
//! retry or parsing logic in [`crate::pipeline::classify`]. Callers can
//! override the default via [`crate::config::FilingConfig::prompt`].

/// Answer the model is told to give when it cannot find an issuer.
///
/// [`crate::pipeline::classify::parse_company_name`] treats it as a failed
/// classification rather than a company called "Unknown_Company".
pub const UNKNOWN_COMPANY: &str = "Unknown_Company";

/// Default instruction sent alongside the first page of each certificate.
pub const DEFAULT_CLASSIFY_PROMPT: &str = r#"Analyze this certificate image carefully and extract ONLY the company or organization name that issued this certificate.

Instructions:
1. Look for the PRIMARY company name that appears as the issuer or provider of the certificate
2. This is usually at the top of the certificate or in a prominent position
3. Return ONLY the company name, no additional text or explanations
4. If multiple company names appear, choose the main issuer (not partners or sponsors)
5. Remove common business suffixes like Inc., LLC, Ltd., Corp., Corporation, Company
6. If no clear company name is found, return "Unknown_Company"

Where to look, by certificate type:
- Training certificates: the training provider or platform
- Professional certifications: the certifying organization
- Course completion: the educational institution or platform
- Achievement certificates: the awarding organization

Examples:
- "Google LLC Certificate of Completion" → Google
- "Microsoft Corporation Training Certificate" → Microsoft
- "Amazon Web Services Certification" → Amazon Web Services
- "edX Verified Certificate" → edX
- "LinkedIn Learning Certificate" → LinkedIn Learning

Extract the company name:"#;
