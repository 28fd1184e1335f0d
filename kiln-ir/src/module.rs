//! Module and Global Variables
//!
//! The module owns every function, global and attribute, plus the target
//! description. Functions and globals share one symbol namespace.

use kiln_common::{ConstructionError, FunctionId, GlobalId, LabelId, TargetDescription, TempId};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use crate::{
    Attribute, AttributeIndex, AttributeTable, BasicBlock, Function, IrType, Linkage, Value, ValueKind,
};

/// Initial contents of a global
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    /// Raw bytes, for `[N x i8]` data such as string literals
    Bytes(Vec<u8>),
    /// Integer bits
    Int(u64),
    /// IEEE bits
    Float(u64),
    /// All-zero initializer of any sized type
    Zero,
}

impl Constant {
    /// Whether this initializer fits a global of type `ty`
    pub fn matches(&self, ty: &IrType) -> bool {
        match self {
            Constant::Bytes(bytes) => matches!(
                ty,
                IrType::Array { size, element_type } if **element_type == IrType::i8() && *size == bytes.len() as u64
            ),
            Constant::Int(_) => ty.is_integer(),
            Constant::Float(_) => ty.is_float(),
            Constant::Zero => ty.size_in_bytes().is_some(),
        }
    }
}

/// Global variable or constant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub id: GlobalId,
    pub name: String,
    /// Type of the stored datum; the global's address is a pointer to it
    pub value_type: IrType,
    pub is_constant: bool,
    pub initializer: Option<Constant>,
    pub linkage: Linkage,
}

impl GlobalVariable {
    pub fn is_declaration(&self) -> bool {
        self.initializer.is_none()
    }

    /// Pointer-typed value referring to this global
    pub fn address(&self) -> Value {
        Value::new(ValueKind::Global(self.id), self.value_type.ptr_to())
    }
}

/// Handle to a block inside a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub function: FunctionId,
    pub label: LabelId,
}

enum Symbol {
    Function(FunctionId),
    Global(GlobalId),
}

/// IR Module - represents a complete compilation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub target: TargetDescription,
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVariable>,
    pub attributes: AttributeTable,
    next_temp: TempId,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            target: TargetDescription::default(),
            functions: Vec::new(),
            globals: Vec::new(),
            attributes: AttributeTable::new(),
            next_temp: 0,
        }
    }

    pub fn set_target(&mut self, target: TargetDescription) {
        self.target = target;
    }

    /// Allocate a module-unique temp id
    pub fn fresh_temp(&mut self) -> TempId {
        let temp = self.next_temp;
        self.next_temp += 1;
        temp
    }

    /// Next temp id that will be handed out
    pub fn next_temp(&self) -> TempId {
        self.next_temp
    }

    /// Make sure temps below `next` are never handed out again
    pub fn reserve_temps(&mut self, next: TempId) {
        self.next_temp = self.next_temp.max(next);
    }

    fn lookup_symbol(&self, name: &str) -> Option<Symbol> {
        if let Some(function) = self.functions.iter().find(|f| f.name == name) {
            return Some(Symbol::Function(function.id));
        }
        self.globals
            .iter()
            .find(|g| g.name == name)
            .map(|g| Symbol::Global(g.id))
    }

    pub fn is_symbol_taken(&self, name: &str) -> bool {
        self.lookup_symbol(name).is_some()
    }

    /// `base`, or `base.N` for the first free N
    pub fn unique_symbol_name(&self, base: &str) -> String {
        if !self.is_symbol_taken(base) {
            return base.to_string();
        }
        (1u32..)
            .map(|n| format!("{base}.{n}"))
            .find(|candidate| !self.is_symbol_taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Declare a function; an identical redeclaration returns the existing handle
    pub fn declare_function(&mut self, name: &str, fn_type: &IrType) -> Result<FunctionId, ConstructionError> {
        match self.lookup_symbol(name) {
            Some(Symbol::Function(id)) => {
                let existing = self.functions[id.index()].fn_type();
                if existing == *fn_type {
                    trace!("Redeclaration of '{name}' reuses {id}");
                    Ok(id)
                } else {
                    Err(ConstructionError::DuplicateSymbol {
                        name: name.to_string(),
                        existing: format!("function {existing}"),
                        requested: format!("function {fn_type}"),
                    })
                }
            }
            Some(Symbol::Global(id)) => Err(ConstructionError::DuplicateSymbol {
                name: name.to_string(),
                existing: format!("global {}", self.globals[id.index()].value_type),
                requested: format!("function {fn_type}"),
            }),
            None => {
                let id = FunctionId(self.functions.len() as u32);
                let function = Function::declare(id, name, fn_type).ok_or_else(|| {
                    ConstructionError::type_mismatch(&format!("declaration of '{name}'"), "a function type", fn_type)
                })?;
                debug!("Declared function '{name}' as {id}: {fn_type}");
                self.functions.push(function);
                Ok(id)
            }
        }
    }

    /// Declare an external global; an identical redeclaration returns the existing handle
    pub fn declare_global(&mut self, name: &str, value_type: &IrType) -> Result<GlobalId, ConstructionError> {
        match self.lookup_symbol(name) {
            Some(Symbol::Global(id)) => {
                let existing = &self.globals[id.index()].value_type;
                if existing == value_type {
                    Ok(id)
                } else {
                    Err(ConstructionError::DuplicateSymbol {
                        name: name.to_string(),
                        existing: format!("global {existing}"),
                        requested: format!("global {value_type}"),
                    })
                }
            }
            Some(Symbol::Function(id)) => Err(ConstructionError::DuplicateSymbol {
                name: name.to_string(),
                existing: format!("function {}", self.functions[id.index()].fn_type()),
                requested: format!("global {value_type}"),
            }),
            None => {
                let id = GlobalId(self.globals.len() as u32);
                debug!("Declared global '{name}' as {id}: {value_type}");
                self.globals.push(GlobalVariable {
                    id,
                    name: name.to_string(),
                    value_type: value_type.clone(),
                    is_constant: false,
                    initializer: None,
                    linkage: Linkage::External,
                });
                Ok(id)
            }
        }
    }

    /// Add an internal, immutable, initialized global; the name is uniqued
    pub fn add_global_constant(
        &mut self,
        name: &str,
        value_type: &IrType,
        initializer: Constant,
    ) -> Result<GlobalId, ConstructionError> {
        if !initializer.matches(value_type) {
            return Err(ConstructionError::type_mismatch(
                &format!("initializer of '{name}'"),
                value_type,
                format!("{initializer:?}"),
            ));
        }
        let id = GlobalId(self.globals.len() as u32);
        let name = self.unique_symbol_name(name);
        debug!("Added global constant '{name}' as {id}: {value_type}");
        self.globals.push(GlobalVariable {
            id,
            name,
            value_type: value_type.clone(),
            is_constant: true,
            initializer: Some(initializer),
            linkage: Linkage::Internal,
        });
        Ok(id)
    }

    /// Append a block to a function; non-empty labels are uniqued per function
    pub fn append_block(&mut self, function: FunctionId, label: &str) -> Result<BlockRef, ConstructionError> {
        let func = self.function_mut(function)?;
        let id = func.next_label();
        let name = if label.is_empty() || !func.blocks.iter().any(|b| b.name == label) {
            label.to_string()
        } else {
            (1u32..)
                .map(|n| format!("{label}{n}"))
                .find(|candidate| !func.blocks.iter().any(|b| &b.name == candidate))
                .unwrap_or_else(|| label.to_string())
        };
        trace!("Appending block '{}' ({}) to '{}'", name, id, func.name);
        func.add_block(BasicBlock::new(id, &name));
        Ok(BlockRef { function, label: id })
    }

    pub fn set_linkage(&mut self, function: FunctionId, linkage: Linkage) -> Result<(), ConstructionError> {
        self.function_mut(function)?.linkage = linkage;
        Ok(())
    }

    pub fn set_global_linkage(&mut self, global: GlobalId, linkage: Linkage) -> Result<(), ConstructionError> {
        let entry = self.globals.get_mut(global.index()).ok_or_else(|| ConstructionError::UnknownEntity {
            kind: "global".to_string(),
            name: global.to_string(),
        })?;
        entry.linkage = linkage;
        Ok(())
    }

    /// Attach advisory metadata to a function or one of its positions
    pub fn add_attribute(
        &mut self,
        function: FunctionId,
        index: AttributeIndex,
        attribute: Attribute,
    ) -> Result<(), ConstructionError> {
        self.function(function)?;
        self.attributes.add(function, index, attribute);
        Ok(())
    }

    pub fn function(&self, id: FunctionId) -> Result<&Function, ConstructionError> {
        self.functions.get(id.index()).ok_or_else(|| ConstructionError::UnknownEntity {
            kind: "function".to_string(),
            name: id.to_string(),
        })
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Result<&mut Function, ConstructionError> {
        self.functions.get_mut(id.index()).ok_or_else(|| ConstructionError::UnknownEntity {
            kind: "function".to_string(),
            name: id.to_string(),
        })
    }

    pub fn global(&self, id: GlobalId) -> Option<&GlobalVariable> {
        self.globals.get(id.index())
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn block(&self, block: BlockRef) -> Option<&BasicBlock> {
        self.functions.get(block.function.index())?.get_block(block.label)
    }

    pub fn block_mut(&mut self, block: BlockRef) -> Option<&mut BasicBlock> {
        self.functions.get_mut(block.function.index())?.get_block_mut(block.label)
    }

    /// Pointer-typed value referring to a function
    pub fn function_address(&self, id: FunctionId) -> Result<Value, ConstructionError> {
        let function = self.function(id)?;
        Ok(Value::new(ValueKind::Function(id), function.fn_type().ptr_to()))
    }

    pub fn global_address(&self, id: GlobalId) -> Option<Value> {
        self.global(id).map(GlobalVariable::address)
    }

    /// Total instruction count over all functions
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(Function::instruction_count).sum()
    }
}
