//! Validation utilities

use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an amount is strictly positive
pub fn validate_positive_amount(amount: &BigDecimal) -> BillingResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(BillingError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an amount is not negative
pub fn validate_non_negative_amount(amount: &BigDecimal) -> BillingResult<()> {
    if *amount < BigDecimal::from(0) {
        Err(BillingError::Validation(
            "Amount cannot be negative".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that a display name is valid
pub fn validate_name(name: &str) -> BillingResult<()> {
    if name.trim().is_empty() {
        return Err(BillingError::Validation("Name cannot be empty".to_string()));
    }

    if name.len() > 100 {
        return Err(BillingError::Validation(
            "Name cannot exceed 100 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that a description is valid
pub fn validate_description(description: &str) -> BillingResult<()> {
    if description.trim().is_empty() {
        return Err(BillingError::Validation(
            "Description cannot be empty".to_string(),
        ));
    }

    if description.len() > 500 {
        return Err(BillingError::Validation(
            "Description cannot exceed 500 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that a feature code is valid
pub fn validate_feature_code(code: &str) -> BillingResult<()> {
    if code.trim().is_empty() {
        return Err(BillingError::Validation(
            "Feature code cannot be empty".to_string(),
        ));
    }

    if code.len() > 50 {
        return Err(BillingError::Validation(
            "Feature code cannot exceed 50 characters".to_string(),
        ));
    }

    // Check for valid characters (alphanumeric, dashes, underscores)
    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BillingError::Validation(
            "Feature code can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate that a contract term length is within range
pub fn validate_term_months(months: u32) -> BillingResult<()> {
    if months == 0 {
        return Err(BillingError::Validation(
            "Term length must be at least one month".to_string(),
        ));
    }

    if months > 60 {
        return Err(BillingError::Validation(
            "Term length cannot exceed 60 months".to_string(),
        ));
    }

    Ok(())
}

/// Enhanced plan validator with detailed checks
pub struct EnhancedPlanValidator;

impl PlanValidator for EnhancedPlanValidator {
    fn validate_draft(&self, draft: &PlanDraft) -> BillingResult<()> {
        validate_name(&draft.name)?;
        validate_non_negative_amount(&draft.base_amount)?;

        if let Some(ref description) = draft.description {
            validate_description(description)?;
        }

        Ok(())
    }

    fn validate_plan(&self, plan: &Plan) -> BillingResult<()> {
        validate_name(&plan.name)?;
        validate_non_negative_amount(&plan.base_amount)?;

        if let Some(ref description) = plan.description {
            validate_description(description)?;
        }

        Ok(())
    }
}

/// Enhanced child validator with detailed checks
pub struct EnhancedChildValidator;

impl ChildValidator for EnhancedChildValidator {
    fn validate_child(&self, kind: ChildKind, proposed: &ProposedChild) -> BillingResult<()> {
        // Basic validation
        DefaultChildValidator.validate_child(kind, proposed)?;

        // Enhanced validations
        match &proposed.fields {
            ChildFields::Term(term) => {
                validate_name(&term.label)?;
                validate_term_months(term.months)?;
                validate_non_negative_amount(&term.monthly_amount)?;
            }
            ChildFields::Charge(charge) => {
                validate_description(&charge.description)?;
                validate_positive_amount(&charge.amount)?;
            }
            ChildFields::Feature(feature) => {
                validate_feature_code(&feature.code)?;
                validate_name(&feature.label)?;
                validate_non_negative_amount(&feature.monthly_amount)?;
            }
        }

        Ok(())
    }
}

/// Enhanced entry validator with detailed checks
pub struct EnhancedEntryValidator;

impl EntryValidator for EnhancedEntryValidator {
    fn validate_draft(&self, draft: &EntryDraft) -> BillingResult<()> {
        validate_description(&draft.description)?;
        validate_positive_amount(&draft.amount)?;
        Ok(())
    }

    fn validate_entry(&self, entry: &BillingEntry) -> BillingResult<()> {
        validate_description(&entry.description)?;
        validate_positive_amount(&entry.amount)?;
        Ok(())
    }
}
