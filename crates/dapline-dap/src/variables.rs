//! Variable Resolver - lazily fetched variable trees
//!
//! Containers are keyed by the adapter's opaque `variablesReference`. Each
//! container is fetched once and cached until invalidated; children point
//! back at their owner by reference id only, so there are no ownership
//! cycles.

use crate::client::{call, DapClientRef};
use crate::constants::{eval_contexts, requests};
use crate::threads::StackFrameSlot;
use crate::{
    Error, EvaluateArguments, EvaluateResponseBody, Result, ScopesArguments, ScopesResponseBody,
    SetVariableArguments, SetVariableResponseBody, VariablesArguments, VariablesResponseBody,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Value of a variable, possibly with children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValue {
    pub display: String,
    pub type_name: Option<String>,
    /// Children container; `<= 0` means none
    pub reference: i64,
}

impl VariableValue {
    pub fn has_children(&self) -> bool {
        self.reference > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: VariableValue,
    /// Container this variable was listed in; 0 for scopes and evaluation results
    pub owner_reference: i64,
}

impl Variable {
    fn from_protocol(variable: crate::Variable, owner_reference: i64) -> Self {
        Self {
            name: variable.name,
            value: VariableValue {
                display: variable.value,
                type_name: variable.var_type,
                reference: variable.variables_reference,
            },
            owner_reference,
        }
    }

    fn from_scope(scope: crate::Scope) -> Self {
        Self {
            name: scope.name,
            value: VariableValue {
                display: String::new(),
                type_name: None,
                reference: scope.variables_reference,
            },
            owner_reference: 0,
        }
    }
}

pub struct VariableResolver {
    client: DapClientRef,
    containers: Mutex<HashMap<i64, Vec<Variable>>>,
}

impl VariableResolver {
    pub fn new(client: DapClientRef) -> Self {
        Self {
            client,
            containers: Mutex::new(HashMap::new()),
        }
    }

    fn containers(&self) -> MutexGuard<'_, HashMap<i64, Vec<Variable>>> {
        self.containers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scopes of a frame, cached on the frame slot
    pub async fn scopes(&self, frame: &StackFrameSlot) -> Result<Vec<Variable>> {
        if let Some(scopes) = frame.cached_scopes() {
            return Ok(scopes);
        }
        let frame_id = frame.id();
        let body: ScopesResponseBody = self
            .fetch(requests::SCOPES, &ScopesArguments { frame_id })
            .await?;
        let scopes: Vec<Variable> = body.scopes.into_iter().map(Variable::from_scope).collect();
        frame.store_scopes(frame_id, scopes.clone());
        Ok(scopes)
    }

    /// Children of a container, fetched once
    pub async fn get_variables(&self, reference: i64) -> Result<Vec<Variable>> {
        if reference <= 0 {
            return Ok(Vec::new());
        }
        if let Some(cached) = self.containers().get(&reference) {
            return Ok(cached.clone());
        }

        let body: VariablesResponseBody = self
            .fetch(
                requests::VARIABLES,
                &VariablesArguments {
                    variables_reference: reference,
                },
            )
            .await?;
        let variables: Vec<Variable> = body
            .variables
            .into_iter()
            .map(|v| Variable::from_protocol(v, reference))
            .collect();
        self.containers().insert(reference, variables.clone());
        Ok(variables)
    }

    /// Assign `expression` to `variable`.
    ///
    /// The owning container is invalidated so siblings are refetched. When
    /// the adapter does not echo a value, `expression` is shown instead.
    pub async fn set_value(&self, variable: &Variable, expression: &str) -> Result<Variable> {
        if variable.owner_reference <= 0 {
            return Err(Error::request_failed(
                requests::SET_VARIABLE,
                format!("'{}' has no owning container", variable.name),
            ));
        }

        let body: SetVariableResponseBody = call(
            self.client.as_ref(),
            requests::SET_VARIABLE,
            &SetVariableArguments {
                variables_reference: variable.owner_reference,
                name: variable.name.clone(),
                value: expression.to_string(),
            },
        )
        .await?;

        {
            let mut containers = self.containers();
            containers.remove(&variable.owner_reference);
            if variable.value.has_children() {
                containers.remove(&variable.value.reference);
            }
        }

        Ok(Variable {
            name: variable.name.clone(),
            value: VariableValue {
                display: body.value.unwrap_or_else(|| expression.to_string()),
                type_name: body.var_type.or_else(|| variable.value.type_name.clone()),
                reference: body.variables_reference.unwrap_or(0),
            },
            owner_reference: variable.owner_reference,
        })
    }

    /// Evaluate in hover context; the result is named after the expression
    pub async fn evaluate(&self, frame_id: Option<i64>, expression: &str) -> Result<Variable> {
        let body: EvaluateResponseBody = call(
            self.client.as_ref(),
            requests::EVALUATE,
            &EvaluateArguments {
                expression: expression.to_string(),
                frame_id,
                context: Some(eval_contexts::HOVER.to_string()),
            },
        )
        .await?;

        Ok(Variable {
            name: expression.to_string(),
            value: VariableValue {
                display: body.result,
                type_name: body.var_type,
                reference: body.variables_reference,
            },
            owner_reference: 0,
        })
    }

    pub fn invalidate(&self, reference: i64) {
        self.containers().remove(&reference);
    }

    /// Drop every cached container; references are only valid while suspended
    pub fn clear(&self) {
        let mut containers = self.containers();
        if !containers.is_empty() {
            debug!("Clearing {} cached variable container(s)", containers.len());
            containers.clear();
        }
    }

    pub fn cached_container_count(&self) -> usize {
        self.containers().len()
    }

    /// Closed channel means no data, not an error
    async fn fetch<A, B>(&self, command: &str, arguments: &A) -> Result<B>
    where
        A: serde::Serialize,
        B: serde::de::DeserializeOwned + Default,
    {
        match call(self.client.as_ref(), command, arguments).await {
            Ok(body) => Ok(body),
            Err(_) if self.client.is_closed() => Ok(B::default()),
            Err(e) => Err(e),
        }
    }
}
